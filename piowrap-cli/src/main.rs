//! piowrap, a PlatformIO wrapper.
//!
//! Prepares the child environment, stages bundled archives, runs the build
//! tool with the remaining arguments and, for `run` builds, signs and/or
//! encrypts the produced firmware.
//!
//! ```text
//! piowrap [--wrapper-config FILE] [--wrapper-report FILE] <build tool args...>
//!         [--bazel-unzip ARCHIVE:DEST]... [--sign-key KEY] [--encrypt-key KEY]
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use piowrap_core::{
    run_wrapper, ArtifactLayout, BuildInvocation, ExternalBuildTool, HostEnv, PostProcessReport,
    SecureTool, ToolEnv, WrapperConfig, WrapperContext, FAILURE_EXIT_CODE,
};

#[derive(Parser)]
#[command(
    name = "piowrap",
    about = "PlatformIO wrapper with archive staging and firmware signing/encryption",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// Wrapper configuration file (TOML).
    #[arg(long, env = "PIOWRAP_CONFIG")]
    wrapper_config: Option<PathBuf>,

    /// Write a JSON post-processing report here.
    #[arg(long, env = "PIOWRAP_REPORT")]
    wrapper_report: Option<PathBuf>,

    /// Build tool arguments, with wrapper flags mixed in.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("PIOWRAP_LOG", "warn"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    ExitCode::from(exit_status(wrapper_exit_code(run(cli))))
}

/// Build tool code on success, [`FAILURE_EXIT_CODE`] after reporting any error.
fn wrapper_exit_code(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("piowrap error: {err:#}");
            FAILURE_EXIT_CODE
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let host = HostEnv::capture().context("failed to inspect the current process")?;
    let config = WrapperConfig::load(cli.wrapper_config.as_deref(), &host)?
        .with_env_overrides(&host);

    let invocation = BuildInvocation::parse(cli.args, &host);
    let env = ToolEnv::prepare(&host, &config.deps);
    let layout = ArtifactLayout::from(&config.build);
    let driver = ExternalBuildTool::new(&config.build.tool);
    let transformer = SecureTool::new(&config.secure, env.clone());

    let ctx = WrapperContext {
        host: &host,
        env: &env,
        layout: &layout,
        driver: &driver,
        transformer: &transformer,
    };

    let outcome = run_wrapper(&invocation, &ctx)?;

    if let Some(report) = &outcome.report {
        print_summary(report);
        if let Some(path) = &cli.wrapper_report {
            write_report(&host.absolutize(path), report)?;
        }
    }

    Ok(outcome.exit_code)
}

fn print_summary(report: &PostProcessReport) {
    if report.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("=== Post-processing ===");
    for artifact in &report.artifacts {
        let steps: Vec<&str> = artifact.steps.iter().map(|s| s.name()).collect();
        eprintln!(
            "{:<16} {:<14} {}",
            artifact.board,
            steps.join("+"),
            &artifact.digest_after[..16]
        );
    }
    eprintln!();
}

fn write_report(path: &Path, report: &PostProcessReport) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = report.to_json()?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("report written to {}", path.display());
    Ok(())
}

/// Codes outside `0..=255` cannot be reported as-is and become a failure.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(FAILURE_EXIT_CODE as u8)
}
