//! Command-line argument definitions for cmssw-sandbox.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for cmssw-sandbox.
#[derive(Debug, Parser)]
#[command(name = "cmssw-sandbox")]
#[command(
    author,
    version,
    about = "Packages CMSSW releases into sandboxes for remote batch execution"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// CMSSW release root. Defaults to `$LOCALRT`.
    #[arg(long, global = true)]
    pub release: Option<String>,

    /// Directory sandboxes are written to.
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build (or reuse) a sandbox for the release.
    Package(PackageArgs),

    /// Show the release version, architecture and sandbox name.
    Inspect,

    /// Package the release, then copy the sandbox into the staging directory.
    Stage(StageArgs),
}

/// Arguments controlling what goes into a sandbox.
#[derive(Debug, Default, Parser)]
pub struct PackageArgs {
    /// Pre-built sandbox to reuse instead of packing the release.
    #[arg(long)]
    pub recycle: Option<String>,

    /// Extra path under the release `src` directory (`source->archive/name`
    /// renames it). May be repeated.
    #[arg(long = "include", value_name = "PATH")]
    pub include: Vec<String>,

    /// Basename glob to leave out of the sandbox. May be repeated.
    #[arg(long = "blacklist", value_name = "GLOB")]
    pub blacklist: Vec<String>,
}

/// Arguments for the `stage` subcommand.
#[derive(Debug, Default, Parser)]
pub struct StageArgs {
    /// Inclusion options, as for `package`.
    #[command(flatten)]
    pub package: PackageArgs,

    /// Staging directory. Defaults to `stage.directory`.
    #[arg(long)]
    pub destination: Option<String>,
}

impl Cli {
    /// Inclusion options given to the active subcommand, if it takes any.
    #[must_use]
    pub const fn package_args(&self) -> Option<&PackageArgs> {
        match &self.command {
            Commands::Package(args) => Some(args),
            Commands::Stage(args) => Some(&args.package),
            Commands::Inspect => None,
        }
    }

    /// Staging directory override, when given.
    #[must_use]
    pub fn stage_destination(&self) -> Option<&str> {
        match &self.command {
            Commands::Stage(args) => args.destination.as_deref(),
            Commands::Package(_) | Commands::Inspect => None,
        }
    }
}
