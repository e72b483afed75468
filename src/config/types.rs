//! Configuration data types for cmssw-sandbox.

use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::sandbox::DEFAULT_ARCH_PREFIX;

/// Default directory local workers read staged sandboxes from.
pub const DEFAULT_STAGE_DIRECTORY: &str = "~/.parslcms";

/// Inclusion policy applied when packing a release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Extra paths under the release `src` directory, optionally renamed
    /// with `source->archive/name`.
    pub include: Vec<String>,

    /// Basename globs left out of the archive.
    pub blacklist: Vec<String>,

    /// Prefixes identifying platform entries under `.SCRAM`. Empty means
    /// the default `slc` prefix.
    pub arch_prefixes: Vec<String>,
}

impl SandboxConfig {
    /// Configured platform prefixes, or `["slc"]` when none are set.
    #[must_use]
    pub fn effective_arch_prefixes(&self) -> Vec<String> {
        if self.arch_prefixes.is_empty() {
            vec![String::from(DEFAULT_ARCH_PREFIX)]
        } else {
            self.arch_prefixes.clone()
        }
    }
}

/// Local staging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StageConfig {
    /// Directory sandboxes are copied into by `stage`. `~` and `$VAR` are
    /// expanded.
    pub directory: String,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            directory: String::from(DEFAULT_STAGE_DIRECTORY),
        }
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `CMSSW_SANDBOX_CONFIG_PATH` environment variable
/// 2. `.cmssw-sandbox.toml` in the current working directory
/// 3. `.cmssw-sandbox.toml` in the home directory
/// 4. `~/.config/cmssw-sandbox/config.toml` (XDG default)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "CMSSW_SANDBOX",
    post_merge_hook,
    discovery(
        app_name = "cmssw-sandbox",
        env_var = "CMSSW_SANDBOX_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".cmssw-sandbox.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// Release root to package. Falls back to `LOCALRT` when unset.
    pub release: Option<String>,

    /// Directory sandboxes are written to. Defaults to the working directory.
    pub output_dir: Option<String>,

    /// A pre-built sandbox to reuse instead of packaging the release.
    pub recycle: Option<String>,

    /// Inclusion policy.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub sandbox: SandboxConfig,

    /// Local staging configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub stage: StageConfig,
}

impl AppConfig {
    /// Checks values that cannot be expressed by the field types alone.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the staging directory is blank.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.stage.directory.trim().is_empty() {
            return Err(crate::error::ConfigError::InvalidValue {
                field: String::from("stage.directory"),
                reason: String::from("must not be empty"),
            }
            .into());
        }
        Ok(())
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // Blank values from the environment or templated files mean "unset".
        for value in [&mut self.release, &mut self.output_dir, &mut self.recycle] {
            if value.as_deref().is_some_and(|text| text.trim().is_empty()) {
                *value = None;
            }
        }
        for list in [
            &mut self.sandbox.include,
            &mut self.sandbox.blacklist,
            &mut self.sandbox.arch_prefixes,
        ] {
            normalise_list(list);
        }
        Ok(())
    }
}

fn normalise_list(list: &mut Vec<String>) {
    list.retain(|entry| !entry.trim().is_empty());
    for entry in list.iter_mut() {
        let trimmed = entry.trim();
        if trimmed.len() != entry.len() {
            *entry = String::from(trimmed);
        }
    }
}
