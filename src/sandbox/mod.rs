//! Sandbox construction and recycling.
//!
//! A sandbox is a `tar.bz2` archive holding the subset of a local CMSSW release
//! needed to rebuild its runtime environment on a remote worker. Packaging is
//! keyed on the release path: a sandbox already present under the computed
//! name is reused as-is, and a previously built sandbox can be recycled
//! without touching the release at all.
//!
//! # Example
//!
//! ```ignore
//! use cmssw_sandbox::sandbox::{InclusionSpec, Sandbox};
//!
//! let sandbox = Sandbox::new("/home/user/CMSSW_10_2_3", InclusionSpec::default());
//! let packaged = sandbox.package("/scratch/sandboxes".as_ref())?;
//! println!("{} {} {}", packaged.version(), packaged.architecture(), packaged.archive_path());
//! ```

mod archive;
mod listing;
mod naming;
mod output;
mod release;
mod selection;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::{ConfigError, FilesystemError, Result};
use archive::SandboxArchiver;

pub(crate) use output::OutputDir;

pub use naming::{
    ARCHIVE_EXTENSION, ARCHIVE_PREFIX, FINGERPRINT_LENGTH, RecycleNameParser, archive_file_name,
    release_fingerprint,
};
pub use release::{
    DEFAULT_ARCH_PREFIX, ENVIRONMENT_FILE, METADATA_DIR, PathExpander, RELEASE_ENV_VAR,
    ReleaseDescriptor, VERSION_KEY, absolutize, current_dir, parse_environment_value,
};
pub use selection::{
    FIXED_ENTRIES, IncludeEntry, PACKAGED_SUBDIRS, PackingFilter, SOURCE_DIR, is_hidden,
    is_version_control, matches_blacklist, select_entries,
};

/// What to put into a sandbox, or which existing sandbox to reuse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionSpec {
    /// Extra entries relative to the release `src` directory.
    pub include: Vec<IncludeEntry>,
    /// Basename globs excluded from the archive.
    pub blacklist: Vec<String>,
    /// A pre-built sandbox to copy instead of packaging the release.
    pub recycle: Option<Utf8PathBuf>,
}

/// How a packaged sandbox came to exist in the output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxOrigin {
    /// The archive was written by this call.
    Built,
    /// An archive with the computed name already existed and was kept.
    Reused,
    /// A pre-built archive was copied in.
    Recycled,
}

/// Result of a packaging call: everything a job needs to stage the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedSandbox {
    version: String,
    architecture: String,
    archive_path: Utf8PathBuf,
    origin: SandboxOrigin,
}

impl PackagedSandbox {
    /// Release version, also the archive's top-level directory.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Platform tag the sandbox was built for.
    #[must_use]
    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    /// Location of the archive in the output directory.
    #[must_use]
    pub fn archive_path(&self) -> &Utf8Path {
        &self.archive_path
    }

    /// Whether the archive was built, reused, or recycled.
    #[must_use]
    pub const fn origin(&self) -> SandboxOrigin {
        self.origin
    }

    /// Split into `(version, architecture, archive_path)`.
    #[must_use]
    pub fn into_parts(self) -> (String, String, Utf8PathBuf) {
        (self.version, self.architecture, self.archive_path)
    }
}

/// Packs a CMSSW release into a sandbox.
///
/// By default the release's `.SCRAM`, `bin`, `cfipython`, `external`, `lib`
/// and `python` directories are packed, together with every `data`, `python`
/// and `interface` directory found under `src`.
#[derive(Debug, Clone)]
pub struct Sandbox {
    release: Utf8PathBuf,
    inclusion: InclusionSpec,
    arch_prefixes: Vec<String>,
}

impl Sandbox {
    /// Create a builder for the release rooted at `release`.
    ///
    /// `release` should already be absolute and expanded; it is fingerprinted
    /// verbatim. Use [`Sandbox::from_app_config`] to resolve user input.
    #[must_use]
    pub fn new(release: impl Into<Utf8PathBuf>, inclusion: InclusionSpec) -> Self {
        Self {
            release: release.into(),
            inclusion,
            arch_prefixes: vec![String::from(DEFAULT_ARCH_PREFIX)],
        }
    }

    /// Replace the platform prefixes used for architecture discovery and
    /// recycled-name parsing.
    #[must_use]
    pub fn with_arch_prefixes(mut self, arch_prefixes: Vec<String>) -> Self {
        self.arch_prefixes = arch_prefixes;
        self
    }

    /// Build a sandbox from resolved configuration.
    ///
    /// The release comes from `config.release` or, failing that, `LOCALRT`
    /// in `env`. Paths are `~`- and `$VAR`-expanded.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReleaseNotConfigured` when no release is
    /// available, and `FilesystemError` when the working directory cannot be
    /// determined.
    pub fn from_app_config<E: mockable::Env>(config: &AppConfig, env: &E) -> Result<Self> {
        let expander = PathExpander::new(env);
        let cwd = current_dir()?;
        let release = expander.resolve_release(config.release.as_deref(), &cwd)?;

        let inclusion = InclusionSpec {
            include: config
                .sandbox
                .include
                .iter()
                .map(|spec| IncludeEntry::parse(spec))
                .collect(),
            blacklist: config.sandbox.blacklist.clone(),
            recycle: config
                .recycle
                .as_deref()
                .filter(|value| !value.is_empty())
                .map(|value| absolutize(&expander.expand(value), &cwd)),
        };

        Ok(Self::new(release, inclusion)
            .with_arch_prefixes(config.sandbox.effective_arch_prefixes()))
    }

    /// Release root being packaged.
    #[must_use]
    pub fn release(&self) -> &Utf8Path {
        &self.release
    }

    /// Configured inclusion policy.
    #[must_use]
    pub const fn inclusion(&self) -> &InclusionSpec {
        &self.inclusion
    }

    /// Inspect the release without writing anything.
    ///
    /// # Errors
    ///
    /// Returns the same configuration and filesystem errors as
    /// [`ReleaseDescriptor::discover`].
    pub fn describe(&self) -> Result<ReleaseDescriptor> {
        ReleaseDescriptor::discover(&self.release, &self.arch_prefixes)
    }

    /// Package the release (or recycle a sandbox) into `output_dir`.
    ///
    /// The output directory is created when missing. A sandbox is written
    /// under a temporary name and renamed into place once complete, so an
    /// existing file under the final name is always a whole archive.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the release cannot be identified or the
    /// recycled name cannot be parsed, and `FilesystemError` for I/O failures.
    /// No archive exists under the final name after an error.
    pub fn package(&self, output_dir: &Utf8Path) -> Result<PackagedSandbox> {
        self.inclusion.recycle.as_deref().map_or_else(
            || self.build(output_dir),
            |recycle| self.recycle(recycle, output_dir),
        )
    }

    fn recycle(&self, recycle: &Utf8Path, output_dir: &Utf8Path) -> Result<PackagedSandbox> {
        let parser = RecycleNameParser::new(&self.arch_prefixes)?;
        let unrecognised = || ConfigError::UnrecognisedRecycleName {
            name: String::from(recycle.as_str()),
        };

        let file_name = recycle.file_name().ok_or_else(unrecognised)?;
        let (version, architecture) = parser.parse(file_name).ok_or_else(unrecognised)?;

        let output = OutputDir::open_or_create(output_dir)?;
        let archive_path = output.copy_in(recycle, file_name)?;
        info!(source = %recycle, sandbox = %archive_path, "recycling sandbox");

        Ok(PackagedSandbox {
            version,
            architecture,
            archive_path,
            origin: SandboxOrigin::Recycled,
        })
    }

    fn build(&self, output_dir: &Utf8Path) -> Result<PackagedSandbox> {
        let descriptor = self.describe()?;
        let filter = PackingFilter::new(&self.inclusion.blacklist)?;
        let file_name = descriptor.archive_file_name();

        let output = OutputDir::open_or_create(output_dir)?;
        if output.contains(&file_name)? {
            let archive_path = output.path().join(&file_name);
            info!(sandbox = %archive_path, "reusing sandbox");
            return Ok(packaged(descriptor, archive_path, SandboxOrigin::Reused));
        }

        let release_dir = release::open_release(&self.release)?;
        let entries = select_entries(&release_dir, &self.release, &self.inclusion.include)
            .map_err(|error| FilesystemError::from_io(self.release.as_std_path(), &error))?;

        info!(sandbox = %output.path().join(&file_name), "packing sandbox");
        debug!(
            release = %descriptor.version(),
            base = %self.release,
            entries = entries.len(),
            "using release"
        );

        let archiver =
            SandboxArchiver::new(&self.release, &release_dir, &filter, descriptor.version());
        let archive_path =
            output.write_atomically(&file_name, |file| archiver.write_bzip2(file, &entries))?;
        debug!(sandbox = %archive_path, "packaged sandbox saved");

        Ok(packaged(descriptor, archive_path, SandboxOrigin::Built))
    }
}

fn packaged(
    descriptor: ReleaseDescriptor,
    archive_path: Utf8PathBuf,
    origin: SandboxOrigin,
) -> PackagedSandbox {
    PackagedSandbox {
        version: String::from(descriptor.version()),
        architecture: String::from(descriptor.architecture()),
        archive_path,
        origin,
    }
}

#[cfg(test)]
mod tests;
