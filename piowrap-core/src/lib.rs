//! piowrap core: environment preparation, build delegation and firmware
//! artifact post-processing around PlatformIO.
//!
//! This crate provides:
//! - A host snapshot and an immutable environment overlay for child processes
//! - Command-line splitting into build-tool and wrapper arguments
//! - Zip archive staging before the build
//! - Delegation to the build tool with exit-code propagation
//! - Artifact discovery and the sign → encrypt post-processing pipeline

pub mod artifacts;
pub mod config;
pub mod driver;
pub mod extract;
pub mod host;
pub mod invocation;
pub mod postprocess;
pub mod toolenv;
pub mod transform;
pub mod wrapper;

pub use artifacts::{discover_artifacts, ArtifactLayout, ArtifactLocation};
pub use config::{ConfigError, WrapperConfig};
pub use driver::{BuildDriver, BuildError, ExternalBuildTool};
pub use extract::{extract_all, extract_archive, ExtractError};
pub use host::{HostEnv, Platform};
pub use invocation::{BuildInvocation, ExtractSpec};
pub use postprocess::{post_process, PostProcessError, PostProcessReport, TransformKeys};
pub use toolenv::ToolEnv;
pub use transform::{ArtifactTransformer, SecureTool, TransformError, TransformStep};
pub use wrapper::{run_wrapper, RunOutcome, WrapperContext, WrapperError, FAILURE_EXIT_CODE};
