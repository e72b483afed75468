//! Shared fixtures and helper functions for config tests.

use crate::config::{AppConfig, DEFAULT_STAGE_DIRECTORY};
use ortho_config::MergeComposer;
use rstest::fixture;
use std::sync::Arc;

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        release = "/home/user/CMSSW_10_2_3"
        output_dir = "/scratch/sandboxes"
        recycle = "/scratch/sandbox-CMSSW_10_2_3-slc6_amd64_gcc700-abc1234.tar.bz2"

        [sandbox]
        include = ["Analysis/Tools", "Extra/Config->config"]
        blacklist = ["*.root", "*.log"]
        arch_prefixes = ["slc", "el"]

        [stage]
        directory = "/scratch/stage"
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r#"
        release = "/home/user/CMSSW_10_2_3"
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(config.release.is_none(), "release should be None");
    assert!(config.output_dir.is_none(), "output_dir should be None");
    assert!(config.recycle.is_none(), "recycle should be None");
    assert!(
        config.sandbox.include.is_empty(),
        "sandbox.include should be empty"
    );
    assert!(
        config.sandbox.blacklist.is_empty(),
        "sandbox.blacklist should be empty"
    );
    assert_eq!(
        config.sandbox.effective_arch_prefixes(),
        vec![String::from("slc")],
        "sandbox.arch_prefixes should fall back to slc"
    );
    assert_eq!(
        config.stage.directory, DEFAULT_STAGE_DIRECTORY,
        "stage.directory should be ~/.parslcms"
    );
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers for testing layer precedence.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    use ortho_config::serde_json::json;

    let mut composer = create_composer_with_defaults()?;

    composer.push_file(
        json!({
            "release": "/from/file/CMSSW_10_2_3",
            "output_dir": "/from/file/sandboxes"
        }),
        None,
    );

    composer.push_environment(json!({
        "release": "/from/env/CMSSW_10_2_3"
    }));

    Ok(composer)
}
