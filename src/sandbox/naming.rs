//! Deterministic sandbox naming and recycled-name parsing.
//!
//! Sandbox names are keyed on the release *path*, not on release contents:
//! `sandbox-<version>-<architecture>-<fingerprint>.tar.bz2`, where the
//! fingerprint is the first seven hex characters of the SHA-1 digest of the
//! absolute release path.

use camino::Utf8Path;
use regex::Regex;
use sha1::{Digest, Sha1};

use crate::error::ConfigError;

/// Leading component of every sandbox file name.
pub const ARCHIVE_PREFIX: &str = "sandbox";

/// Extension of every sandbox file name.
pub const ARCHIVE_EXTENSION: &str = ".tar.bz2";

/// Number of hex characters of the path digest kept in the file name.
pub const FINGERPRINT_LENGTH: usize = 7;

/// Compute the path fingerprint used to make sandbox names release-specific.
///
/// The digest covers the UTF-8 bytes of `release_path` exactly as given, so
/// callers should pass the expanded, absolute path.
#[must_use]
pub fn release_fingerprint(release_path: &Utf8Path) -> String {
    let digest = Sha1::digest(release_path.as_str().as_bytes());
    hex::encode(digest)
        .chars()
        .take(FINGERPRINT_LENGTH)
        .collect()
}

/// Build the sandbox file name for a release.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use cmssw_sandbox::sandbox::archive_file_name;
///
/// let name = archive_file_name(
///     "CMSSW_10_2_3",
///     "slc6_amd64_gcc700",
///     Utf8Path::new("/home/user/CMSSW_10_2_3"),
/// );
/// assert!(name.starts_with("sandbox-CMSSW_10_2_3-slc6_amd64_gcc700-"));
/// assert!(name.ends_with(".tar.bz2"));
/// ```
#[must_use]
pub fn archive_file_name(version: &str, architecture: &str, release_path: &Utf8Path) -> String {
    format!(
        "{ARCHIVE_PREFIX}-{version}-{architecture}-{}{ARCHIVE_EXTENSION}",
        release_fingerprint(release_path)
    )
}

/// Extracts release version and architecture from recycled sandbox names.
///
/// The architecture group must start with one of the configured platform
/// prefixes. With the default `slc` prefix the pattern is
/// `sandbox-(.*)-(slc.*)-[A-Fa-f0-9]*\.tar\.bz2$`, which keeps existing
/// recycled archives usable.
#[derive(Debug, Clone)]
pub struct RecycleNameParser {
    pattern: Regex,
}

impl RecycleNameParser {
    /// Build a parser accepting architectures with any of `arch_prefixes`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when no prefix is configured.
    pub fn new(arch_prefixes: &[String]) -> Result<Self, ConfigError> {
        if arch_prefixes.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: String::from("sandbox.arch_prefixes"),
                reason: String::from("at least one architecture prefix is required"),
            });
        }

        let alternatives = arch_prefixes
            .iter()
            .map(|prefix| regex::escape(prefix))
            .collect::<Vec<_>>()
            .join("|");
        let expression = format!(
            r"{ARCHIVE_PREFIX}-(.*)-((?:{alternatives}).*)-[A-Fa-f0-9]*\.tar\.bz2$"
        );

        let pattern = Regex::new(&expression).map_err(|error| ConfigError::InvalidValue {
            field: String::from("sandbox.arch_prefixes"),
            reason: error.to_string(),
        })?;

        Ok(Self { pattern })
    }

    /// Return `(version, architecture)` when `file_name` is a sandbox name.
    #[must_use]
    pub fn parse(&self, file_name: &str) -> Option<(String, String)> {
        let captures = self.pattern.captures(file_name)?;
        let version = captures.get(1)?.as_str();
        let architecture = captures.get(2)?.as_str();
        Some((String::from(version), String::from(architecture)))
    }
}
