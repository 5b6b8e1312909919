//! Delegation to the embedded build tool.

use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

use crate::toolenv::ToolEnv;

/// Exit code reported when the build tool died without one (signal).
pub const FALLBACK_EXIT_CODE: i32 = 1;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to launch build tool '{program}': {source} (is it installed and on PATH?)")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Something that can run a build and report its exit code.
pub trait BuildDriver {
    fn run(&self, args: &[String], env: &ToolEnv) -> Result<i32, BuildError>;
}

/// Runs the build tool as a child process with inherited stdio.
#[derive(Debug, Clone)]
pub struct ExternalBuildTool {
    program: PathBuf,
}

impl ExternalBuildTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, args: &[String], env: &ToolEnv) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        env.apply(&mut cmd);
        cmd
    }
}

impl BuildDriver for ExternalBuildTool {
    fn run(&self, args: &[String], env: &ToolEnv) -> Result<i32, BuildError> {
        log::info!("running {} {}", self.program.display(), args.join(" "));
        let status = self
            .command(args, env)
            .status()
            .map_err(|source| BuildError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let code = status.code().unwrap_or_else(|| {
            log::warn!("build tool terminated without an exit code ({status})");
            FALLBACK_EXIT_CODE
        });
        log::debug!("build tool exited with {code}");
        Ok(code)
    }
}
