//! `cmssw-sandbox` application entry point.
//!
//! It uses `eyre` for opaque error handling at the application boundary,
//! converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/cmssw-sandbox/config.toml` or path from
//!    `CMSSW_SANDBOX_CONFIG_PATH`)
//! 3. Environment variables (`CMSSW_SANDBOX_*`)
//! 4. Command-line arguments

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use cmssw_sandbox::config::{AppConfig, Cli, Commands, load_config};
use cmssw_sandbox::error::Result as SandboxResult;
use cmssw_sandbox::sandbox::{PackagedSandbox, PathExpander, Sandbox, absolutize, current_dir};
use cmssw_sandbox::stage::{LocalStager, stage_sandbox};
use eyre::{Report, Result as EyreResult};
use mockable::DefaultEnv;
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Installs logging, loads configuration, then dispatches to the subcommand
/// handler.
fn main() -> EyreResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli).map_err(Report::from)?;

    run(&cli, &config).map_err(Report::from)
}

/// Log to stderr so stdout carries only command results.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the CLI command, returning domain-specific errors.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to `eyre::Report`.
fn run(cli: &Cli, config: &AppConfig) -> SandboxResult<()> {
    let env = DefaultEnv::new();
    let sandbox = Sandbox::from_app_config(config, &env)?;

    match &cli.command {
        Commands::Package(_) => {
            let packaged = sandbox.package(&output_dir(config, &env)?)?;
            report_packaged(&packaged);
            Ok(())
        }
        Commands::Inspect => inspect(&sandbox),
        Commands::Stage(_) => {
            let stager = LocalStager::from_app_config(config, &env)?;
            let staged = stage_sandbox(&sandbox, &output_dir(config, &env)?, &stager)?;
            report_packaged(&staged.packaged);
            report_staged(&staged.staged_path);
            Ok(())
        }
    }
}

/// Resolve `output_dir`, defaulting to the working directory.
fn output_dir(config: &AppConfig, env: &DefaultEnv) -> SandboxResult<Utf8PathBuf> {
    let cwd = current_dir()?;
    let expander = PathExpander::new(env);
    Ok(config.output_dir.as_deref().map_or_else(
        || cwd.clone(),
        |configured| absolutize(&expander.expand(configured), &cwd),
    ))
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn report_packaged(packaged: &PackagedSandbox) {
    println!("version: {}", packaged.version());
    println!("architecture: {}", packaged.architecture());
    println!("sandbox: {}", packaged.archive_path());
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn report_staged(staged_path: &Utf8Path) {
    println!("staged: {staged_path}");
}

/// Print what `package` would produce without writing anything.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn inspect(sandbox: &Sandbox) -> SandboxResult<()> {
    let descriptor = sandbox.describe()?;
    println!("release: {}", descriptor.release_path());
    println!("version: {}", descriptor.version());
    println!("architecture: {}", descriptor.architecture());
    println!("sandbox: {}", descriptor.archive_file_name());
    Ok(())
}
