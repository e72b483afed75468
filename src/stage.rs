//! Staging packaged sandboxes where local workers can unpack them.
//!
//! Workers on the submitting host read sandboxes from a fixed directory
//! (`~/.parslcms` by default) rather than receiving them over a transfer
//! channel. [`SandboxStager`] is the seam between packaging and that copy so
//! callers can substitute their own placement strategy.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::config::AppConfig;
use crate::error::{FilesystemError, Result};
use crate::sandbox::{OutputDir, PackagedSandbox, PathExpander, Sandbox, absolutize, current_dir};

/// Places a packaged sandbox where workers expect to find it.
pub trait SandboxStager {
    /// Stage `sandbox` and return the location workers should read.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError` when the archive cannot be copied.
    fn stage(&self, sandbox: &PackagedSandbox) -> Result<Utf8PathBuf>;
}

/// Copies sandboxes into a local directory, creating it when missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalStager {
    destination: Utf8PathBuf,
}

impl LocalStager {
    /// Stage into `destination`.
    #[must_use]
    pub fn new(destination: impl Into<Utf8PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    /// Stage into the configured `stage.directory`, expanding `~` and `$VAR`.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError` when the working directory cannot be read.
    pub fn from_app_config<E: mockable::Env>(config: &AppConfig, env: &E) -> Result<Self> {
        let expanded = PathExpander::new(env).expand(&config.stage.directory);
        Ok(Self::new(absolutize(&expanded, &current_dir()?)))
    }

    /// Directory sandboxes are copied into.
    #[must_use]
    pub fn destination(&self) -> &Utf8Path {
        &self.destination
    }
}

impl SandboxStager for LocalStager {
    fn stage(&self, sandbox: &PackagedSandbox) -> Result<Utf8PathBuf> {
        let source = sandbox.archive_path();
        let file_name = source.file_name().ok_or_else(|| FilesystemError::IoError {
            path: source.as_std_path().to_path_buf(),
            message: String::from("sandbox path does not name a file"),
        })?;

        OutputDir::open_or_create(&self.destination)?.copy_in(source, file_name)
    }
}

/// A packaged sandbox together with its staged copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSandbox {
    /// The sandbox as written to the output directory.
    pub packaged: PackagedSandbox,
    /// Where the stager placed it.
    pub staged_path: Utf8PathBuf,
}

/// Package `sandbox` into `output_dir`, then hand it to `stager`.
///
/// # Errors
///
/// Returns any packaging error unchanged, or the stager's error.
pub fn stage_sandbox<S: SandboxStager + ?Sized>(
    sandbox: &Sandbox,
    output_dir: &Utf8Path,
    stager: &S,
) -> Result<StagedSandbox> {
    let packaged = sandbox.package(output_dir)?;
    let staged_path = stager.stage(&packaged)?;
    info!(sandbox = %packaged.archive_path(), staged = %staged_path, "staged sandbox");

    Ok(StagedSandbox {
        packaged,
        staged_path,
    })
}
