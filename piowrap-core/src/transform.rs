//! Artifact transforms: signing and flash encryption.
//!
//! The [`ArtifactTransformer`] trait is the seam between the post-processor
//! and the external utility. [`SecureTool`] drives `espsecure`:
//!
//! ```text
//! espsecure.py sign_data --version 2 --keyfile KEY --output TMP ARTIFACT
//! espsecure.py encrypt_flash_data --keyfile KEY --address 0x10000 --output TMP ARTIFACT
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::config::SecureSection;
use crate::toolenv::ToolEnv;

/// One transformation applied to an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformStep {
    Sign,
    Encrypt,
}

impl TransformStep {
    /// Fixed application order.
    pub const ORDER: [TransformStep; 2] = [TransformStep::Sign, TransformStep::Encrypt];

    pub fn name(self) -> &'static str {
        match self {
            TransformStep::Sign => "sign",
            TransformStep::Encrypt => "encrypt",
        }
    }
}

impl std::fmt::Display for TransformStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("failed to launch {step} tool '{program}': {source}")]
    Spawn {
        step: TransformStep,
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{step} tool exited with {code}: {stderr}")]
    ToolFailed {
        step: TransformStep,
        code: String,
        stderr: String,
    },

    #[error("{step} tool reported success but wrote no output at {path}")]
    MissingOutput { step: TransformStep, path: PathBuf },
}

/// Writes the transformed form of `input` to `output`. Must not touch `input`.
pub trait ArtifactTransformer {
    fn apply(
        &self,
        step: TransformStep,
        key: &Path,
        input: &Path,
        output: &Path,
    ) -> Result<(), TransformError>;
}

/// The external signing/encryption utility.
#[derive(Debug, Clone)]
pub struct SecureTool {
    program: PathBuf,
    prefix_args: Vec<String>,
    signing_version: u32,
    flash_offset: u32,
    env: ToolEnv,
}

impl SecureTool {
    pub fn new(section: &SecureSection, env: ToolEnv) -> Self {
        Self {
            program: section.tool.clone(),
            prefix_args: section.args.clone(),
            signing_version: section.signing_version,
            flash_offset: section.flash_offset,
            env,
        }
    }

    /// Arguments after any configured prefix for one step.
    pub fn step_args(
        &self,
        step: TransformStep,
        key: &Path,
        input: &Path,
        output: &Path,
    ) -> Vec<String> {
        let mut args: Vec<String> = match step {
            TransformStep::Sign => vec![
                "sign_data".into(),
                "--version".into(),
                self.signing_version.to_string(),
            ],
            TransformStep::Encrypt => vec!["encrypt_flash_data".into()],
        };
        args.push("--keyfile".into());
        args.push(key.display().to_string());
        if step == TransformStep::Encrypt {
            args.push("--address".into());
            args.push(format!("{:#x}", self.flash_offset));
        }
        args.push("--output".into());
        args.push(output.display().to_string());
        args.push(input.display().to_string());
        args
    }

    fn command(&self, step: TransformStep, key: &Path, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args)
            .args(self.step_args(step, key, input, output));
        self.env.apply(&mut cmd);
        cmd
    }
}

impl ArtifactTransformer for SecureTool {
    fn apply(
        &self,
        step: TransformStep,
        key: &Path,
        input: &Path,
        output: &Path,
    ) -> Result<(), TransformError> {
        log::info!("{step}: {}", input.display());
        let result = self
            .command(step, key, input, output)
            .output()
            .map_err(|source| TransformError::Spawn {
                step,
                program: self.program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(TransformError::ToolFailed {
                step,
                code: result
                    .status
                    .code()
                    .map_or_else(|| "no exit code".to_string(), |c| format!("status {c}")),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        if !output.is_file() {
            return Err(TransformError::MissingOutput {
                step,
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }
}
