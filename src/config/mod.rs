//! Configuration system for cmssw-sandbox.
//!
//! This module provides the configuration structures and CLI definitions for
//! the sandbox builder. Precedence merging is handled by the `ortho_config`
//! crate: CLI flags override environment variables, which override
//! configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/cmssw-sandbox/config.toml`
//! by default.
//!
//! # Example Configuration
//!
//! ```toml
//! release = "/home/user/CMSSW_10_2_3"
//! output_dir = "/scratch/sandboxes"
//!
//! [sandbox]
//! include = ["Analysis/Tools", "Extra/Config->config"]
//! blacklist = ["*.root", "*.log"]
//! arch_prefixes = ["slc"]
//!
//! [stage]
//! directory = "~/.parslcms"
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, PackageArgs, StageArgs};
pub use loader::{CONFIG_PATH_ENV_VAR, env_var_names, load_config, load_config_with_env};
pub use types::{AppConfig, DEFAULT_STAGE_DIRECTORY, SandboxConfig, StageConfig};
