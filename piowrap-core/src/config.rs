//! Wrapper configuration loaded from TOML.
//!
//! Every field has a default, so an absent file or an empty one yields a
//! working configuration. Environment overrides are layered on top with
//! [`WrapperConfig::with_env_overrides`].
//!
//! Lookup order for the file itself:
//! 1. explicit path (`--wrapper-config` / `PIOWRAP_CONFIG`)
//! 2. `<cwd>/piowrap.toml`
//! 3. `<user config dir>/piowrap/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::host::HostEnv;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "piowrap.toml";

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level wrapper configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WrapperConfig {
    pub build: BuildSection,
    pub secure: SecureSection,
    pub deps: DepsSection,
}

/// How the build tool is invoked and where its outputs land.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
    /// Build tool program (looked up on PATH when not absolute).
    pub tool: PathBuf,
    /// Output directory relative to the project directory.
    pub output_dir: PathBuf,
    /// Artifact file name inside each board directory.
    pub artifact_name: String,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            tool: PathBuf::from("platformio"),
            output_dir: PathBuf::from(".build-output"),
            artifact_name: "firmware.bin".to_string(),
        }
    }
}

/// External signing/encryption utility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SecureSection {
    pub tool: PathBuf,
    /// Arguments placed before the operation name, e.g. `["-m", "espsecure"]`
    /// when `tool` is a Python interpreter.
    pub args: Vec<String>,
    /// Signature scheme version passed to `sign_data --version`.
    pub signing_version: u32,
    /// Flash address passed to `encrypt_flash_data --address`.
    pub flash_offset: u32,
}

impl Default for SecureSection {
    fn default() -> Self {
        Self {
            tool: PathBuf::from("espsecure.py"),
            args: Vec::new(),
            signing_version: 2,
            flash_offset: 0x10000,
        }
    }
}

/// Bundled dependency resolution for the build tool's interpreter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DepsSection {
    /// Dependency directories; relative entries resolve against the runfiles root.
    pub site_packages: Vec<PathBuf>,
    /// Interpreter exported to the build tool as `PLATFORMIO_PYTHON_EXE`.
    pub python_exe: Option<PathBuf>,
    pub disable_update_check: bool,
}

impl Default for DepsSection {
    fn default() -> Self {
        Self {
            site_packages: Vec::new(),
            python_exe: None,
            disable_update_check: true,
        }
    }
}

impl WrapperConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve and load the configuration file, falling back to defaults
    /// when none of the lookup locations has one.
    pub fn load(explicit: Option<&Path>, host: &HostEnv) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(&host.absolutize(path));
        }

        let candidates = [
            Some(host.cwd().join(LOCAL_CONFIG_FILE)),
            dirs::config_dir().map(|d| d.join("piowrap").join("config.toml")),
        ];
        for path in candidates.into_iter().flatten() {
            if path.is_file() {
                log::debug!("using config file {}", path.display());
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Apply `PIOWRAP_*` environment overrides.
    pub fn with_env_overrides(mut self, host: &HostEnv) -> Self {
        if let Some(tool) = host.var("PIOWRAP_BUILD_TOOL") {
            self.build.tool = PathBuf::from(tool);
        }
        if let Some(tool) = host.var("PIOWRAP_SECURE_TOOL") {
            self.secure.tool = PathBuf::from(tool);
        }
        if let Some(python) = host.var("PIOWRAP_PYTHON") {
            self.deps.python_exe = Some(PathBuf::from(python));
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.build.artifact_name.is_empty() {
            return Err(ConfigError::Invalid("build.artifact_name is empty".into()));
        }
        if self.build.artifact_name.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "build.artifact_name must be a bare file name, got '{}'",
                self.build.artifact_name
            )));
        }
        if self.build.output_dir.is_absolute() {
            return Err(ConfigError::Invalid(
                "build.output_dir must be relative to the project directory".into(),
            ));
        }
        Ok(())
    }
}
