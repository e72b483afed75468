//! Semantic error types for the sandbox builder.
//!
//! This module defines the error hierarchy for `cmssw-sandbox`, following the
//! principle of using semantic error enums (via `thiserror`) for conditions the
//! caller might inspect or report, while reserving opaque errors
//! (`eyre::Report`) for the application boundary.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while resolving configuration or release metadata.
///
/// Every variant is fatal to the current packaging call and is never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No release path was configured and `LOCALRT` is not set.
    #[error(
        "no release configured: run inside a `cmsenv` environment or specify a sandbox release"
    )]
    ReleaseNotConfigured,

    /// The configured release root does not exist.
    #[error("release not found: {path}")]
    ReleaseNotFound {
        /// The release root that was expected.
        path: PathBuf,
    },

    /// The release metadata directory did not contain exactly one platform entry.
    #[error(
        "cannot determine release architecture under '{path}': found {count} candidates",
        count = .candidates.len()
    )]
    UndeterminedArchitecture {
        /// The metadata directory that was scanned.
        path: PathBuf,
        /// Entries matching a platform prefix.
        candidates: Vec<String>,
    },

    /// The release environment file does not define the project version.
    #[error("cannot determine release version: '{key}' missing from '{path}'")]
    MissingVersion {
        /// The environment file that was read.
        path: PathBuf,
        /// The key that was expected.
        key: String,
    },

    /// A recycled sandbox name does not follow the sandbox naming scheme.
    #[error("cannot determine release and architecture from recycled sandbox '{name}'")]
    UnrecognisedRecycleName {
        /// The file name that failed to parse.
        name: String,
    },

    /// A blacklist glob could not be compiled.
    #[error("invalid blacklist pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// A description of the compile failure.
        message: String,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// A file or directory was not found.
    #[error("path not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// An I/O error occurred.
    #[error("I/O error at '{path}': {message}")]
    IoError {
        /// The path where the error occurred.
        path: PathBuf,
        /// A description of the I/O error.
        message: String,
    },
}

impl FilesystemError {
    /// Wrap an `io::Error` raised while operating on `path`.
    ///
    /// `NotFound` errors keep their own variant so callers can distinguish a
    /// missing input from a failing device.
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let target = path.into();
        if error.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound { path: target };
        }
        Self::IoError {
            path: target,
            message: error.to_string(),
        }
    }
}

/// Top-level error type for sandbox operations.
///
/// At the application boundary (main.rs) these errors are converted to
/// `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// An error occurred while resolving configuration or release metadata.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred during filesystem operations.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// A specialised `Result` type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
