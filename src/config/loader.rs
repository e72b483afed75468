//! Configuration loading with layered precedence.
//!
//! This module provides functions to load configuration with the precedence order
//! (lowest to highest): application defaults, configuration file, environment
//! variables, command-line arguments.
//!
//! # Manual layer composition
//!
//! The `OrthoConfig` derive macro provides `load()`, but this loader drives
//! `MergeComposer` directly:
//!
//! 1. **Subcommand separation**: `Cli` owns subcommand dispatch, and the
//!    inclusion flags live on the subcommands rather than on `AppConfig`.
//!
//! 2. **Environment variable validation**: list variables are split and
//!    checked here, and malformed values fail the load instead of being
//!    silently ignored.
//!
//! 3. **Injected environment**: variables are read through `mockable::Env`,
//!    so loading can be tested without mutating the process environment.
//!
//! # Environment Variable Handling
//!
//! String fields (e.g., `CMSSW_SANDBOX_RELEASE`) are always accepted. List
//! fields (e.g., `CMSSW_SANDBOX_BLACKLIST="*.root,*.log"`) are comma-separated;
//! an empty element such as `"*.root,,*.log"` is rejected. An empty variable
//! sets an empty list.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use mockable::DefaultEnv;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV_VAR: &str = "CMSSW_SANDBOX_CONFIG_PATH";

/// Separator between elements of list-valued environment variables.
const LIST_SEPARATOR: char = ',';

// ============================================================================
// Environment Variable Specification Table
// ============================================================================

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Comma-separated list of non-empty strings.
    List,
}

/// Specification for a single environment variable mapping.
struct EnvVarSpec {
    /// The environment variable name (e.g., `CMSSW_SANDBOX_RELEASE`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["sandbox", "blacklist"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all environment variables and their JSON paths.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    // Top-level fields
    EnvVarSpec {
        env_var: "CMSSW_SANDBOX_RELEASE",
        path: &["release"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "CMSSW_SANDBOX_OUTPUT_DIR",
        path: &["output_dir"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "CMSSW_SANDBOX_RECYCLE",
        path: &["recycle"],
        var_type: EnvVarType::String,
    },
    // Sandbox fields
    EnvVarSpec {
        env_var: "CMSSW_SANDBOX_INCLUDE",
        path: &["sandbox", "include"],
        var_type: EnvVarType::List,
    },
    EnvVarSpec {
        env_var: "CMSSW_SANDBOX_BLACKLIST",
        path: &["sandbox", "blacklist"],
        var_type: EnvVarType::List,
    },
    EnvVarSpec {
        env_var: "CMSSW_SANDBOX_ARCH_PREFIXES",
        path: &["sandbox", "arch_prefixes"],
        var_type: EnvVarType::List,
    },
    // Stage fields
    EnvVarSpec {
        env_var: "CMSSW_SANDBOX_STAGE_DIRECTORY",
        path: &["stage", "directory"],
        var_type: EnvVarType::String,
    },
];

/// Returns the list of environment variable names recognised by the config loader.
///
/// Tests use this to clear every `CMSSW_SANDBOX_*` variable without keeping
/// a second list in sync with the loader.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
///
/// Uses `cap_std::fs_utf8` for capability-oriented filesystem access. The
/// function opens the parent directory of the config file and reads from there.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence from the process environment.
///
/// See [`load_config_with_env`].
///
/// # Errors
///
/// Returns `ConfigError` if configuration loading fails.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    load_config_with_env(cli, &DefaultEnv::new())
}

/// Load configuration with full layer precedence.
///
/// This function loads configuration from all available sources:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (`--config`, `CMSSW_SANDBOX_CONFIG_PATH`, or discovery)
/// 3. Environment variables prefixed with `CMSSW_SANDBOX_`, read from `env`
/// 4. Command-line arguments (from the provided `Cli`)
///
/// Later sources override earlier ones.
///
/// # Errors
///
/// Returns `ConfigError` if configuration loading fails due to:
/// - Malformed configuration files
/// - Malformed list-valued environment variables
/// - Values rejected by [`AppConfig::validate`]
pub fn load_config_with_env<E: mockable::Env>(cli: &Cli, env: &E) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    // Layer 1: Defaults (serialised from AppConfig::default()).
    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    // Layer 2: Configuration file.
    if let Some(ref path) = discover_config_path(cli, env) {
        load_config_file(path, &mut composer)?;
    }

    // Layer 3: Environment variables.
    let env_values = collect_env_vars(env)?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    // Layer 4: CLI overrides.
    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;

    Ok(config)
}

/// Pick the configuration file: `--config`, then the path variable, then
/// the first existing discovery candidate.
fn discover_config_path<E: mockable::Env>(cli: &Cli, env: &E) -> Option<Utf8PathBuf> {
    cli.config
        .clone()
        .filter(|path| path.exists())
        .or_else(|| {
            env.string(CONFIG_PATH_ENV_VAR)
                .filter(|value| !value.is_empty())
                .map(Utf8PathBuf::from)
                .filter(|path| path.exists())
        })
        .or_else(|| {
            let discovery = ConfigDiscovery::builder("cmssw-sandbox")
                .env_var(CONFIG_PATH_ENV_VAR)
                .config_file_name("config.toml")
                .dotfile_name(".cmssw-sandbox.toml")
                .build();
            discovery
                .candidates()
                .into_iter()
                .filter(|p| p.exists())
                .find_map(|p| Utf8PathBuf::try_from(p).ok())
        })
}

/// Collect environment variables with the `CMSSW_SANDBOX_` prefix into a JSON value.
///
/// All mappings are defined in [`ENV_VAR_SPECS`].
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a list variable contains an empty
/// element.
fn collect_env_vars<E: mockable::Env>(env: &E) -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Some(raw_value) = env.string(spec.env_var) else {
            continue;
        };

        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::List => Value::Array(
                parse_list(spec.env_var, &raw_value)?
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            ),
        };

        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Split a comma-separated list, trimming whitespace around each element.
fn parse_list(env_var: &str, raw_value: &str) -> Result<Vec<String>> {
    if raw_value.trim().is_empty() {
        return Ok(vec![]);
    }

    let elements = raw_value
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .map(|element| {
            if element.is_empty() {
                Err(ConfigError::InvalidValue {
                    field: String::from(env_var),
                    reason: format!("empty element in comma-separated list '{raw_value}'"),
                })
            } else {
                Ok(String::from(element))
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(elements)
}

/// Insert a value at a nested path in a JSON map.
///
/// For a path like `["sandbox", "blacklist"]`, this creates the intermediate
/// `sandbox` object if needed and inserts `blacklist` within it.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(String::from(segment))
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(String::from(field), value);
}

/// Build a JSON value containing CLI overrides.
///
/// Repeated `--include`/`--blacklist` flags replace the configured list
/// rather than extending it.
fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(ref release) = cli.release {
        overrides.insert(String::from("release"), Value::String(release.clone()));
    }

    if let Some(ref output_dir) = cli.output_dir {
        overrides.insert(String::from("output_dir"), Value::String(output_dir.clone()));
    }

    if let Some(args) = cli.package_args() {
        if let Some(ref recycle) = args.recycle {
            overrides.insert(String::from("recycle"), Value::String(recycle.clone()));
        }
        if !args.include.is_empty() {
            insert_at_path(&mut overrides, &["sandbox", "include"], string_array(&args.include));
        }
        if !args.blacklist.is_empty() {
            insert_at_path(
                &mut overrides,
                &["sandbox", "blacklist"],
                string_array(&args.blacklist),
            );
        }
    }

    if let Some(destination) = cli.stage_destination() {
        insert_at_path(
            &mut overrides,
            &["stage", "directory"],
            Value::String(String::from(destination)),
        );
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}

fn string_array(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}
