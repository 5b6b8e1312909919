//! One wrapper run: stage archives, build, post-process.

use thiserror::Error;

use crate::artifacts::ArtifactLayout;
use crate::driver::{BuildDriver, BuildError};
use crate::extract::{extract_all, ExtractError};
use crate::host::HostEnv;
use crate::invocation::BuildInvocation;
use crate::postprocess::{post_process, PostProcessError, PostProcessReport, TransformKeys};
use crate::toolenv::ToolEnv;
use crate::transform::ArtifactTransformer;

/// Exit code for wrapper-side failures.
pub const FAILURE_EXIT_CODE: i32 = 1;

#[derive(Debug, Error)]
pub enum WrapperError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("post-processing failed after a successful build: {0}")]
    PostProcess(#[from] PostProcessError),
}

/// Everything a run needs besides the invocation itself.
pub struct WrapperContext<'a> {
    pub host: &'a HostEnv,
    pub env: &'a ToolEnv,
    pub layout: &'a ArtifactLayout,
    pub driver: &'a dyn BuildDriver,
    pub transformer: &'a dyn ArtifactTransformer,
}

/// Result of a run that did not fail on the wrapper side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Exit code to report to the shell.
    pub exit_code: i32,
    /// Present when post-processing ran.
    pub report: Option<PostProcessReport>,
}

/// Execute the full sequence for one invocation.
///
/// A non-zero build exit code is returned as-is and skips post-processing.
pub fn run_wrapper(
    invocation: &BuildInvocation,
    ctx: &WrapperContext<'_>,
) -> Result<RunOutcome, WrapperError> {
    let extracted = extract_all(invocation.extract_specs(), ctx.host)?;
    if extracted > 0 {
        log::info!("staged {extracted} archive(s)");
    }

    let exit_code = ctx.driver.run(invocation.passthrough(), ctx.env)?;
    if exit_code != 0 {
        log::debug!("build failed with {exit_code}, skipping post-processing");
        return Ok(RunOutcome {
            exit_code,
            report: None,
        });
    }

    if !invocation.is_run() {
        if invocation.has_keys() {
            log::debug!("keys given but command is not `run`, skipping post-processing");
        }
        return Ok(RunOutcome {
            exit_code,
            report: None,
        });
    }

    let keys = TransformKeys {
        sign: invocation.sign_key().map(Into::into),
        encrypt: invocation.encrypt_key().map(Into::into),
    };
    if keys.is_empty() {
        return Ok(RunOutcome {
            exit_code,
            report: None,
        });
    }

    let report = post_process(
        &invocation.project_dir(),
        ctx.layout,
        &keys,
        ctx.transformer,
    )?;
    Ok(RunOutcome {
        exit_code,
        report: Some(report),
    })
}
