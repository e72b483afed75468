//! Release discovery: path resolution, architecture and version lookup.

use std::io;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;

use crate::error::{ConfigError, FilesystemError, Result};

/// Environment variable exported by `cmsenv` with the active release root.
pub const RELEASE_ENV_VAR: &str = "LOCALRT";

/// Release-level metadata directory maintained by SCRAM.
pub const METADATA_DIR: &str = ".SCRAM";

/// `KEY=VALUE` file inside [`METADATA_DIR`] describing the release.
pub const ENVIRONMENT_FILE: &str = "Environment";

/// Key in [`ENVIRONMENT_FILE`] holding the release version.
pub const VERSION_KEY: &str = "SCRAM_PROJECTVERSION";

/// Platform prefix used when none is configured.
pub const DEFAULT_ARCH_PREFIX: &str = "slc";

/// Expands `~` and `$VAR` references in user-supplied paths.
///
/// Lookups go through a `mockable::Env` so tests can control `HOME` and
/// `LOCALRT` without touching the process environment.
pub struct PathExpander<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> PathExpander<'a, E> {
    /// Creates an expander reading variables from `env`.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Expand a leading `~` or `~/` to `HOME`. Other forms are left untouched.
    #[must_use]
    pub fn expand_user(&self, raw: &str) -> String {
        let Some(rest) = raw.strip_prefix('~') else {
            return String::from(raw);
        };
        if !rest.is_empty() && !rest.starts_with('/') {
            return String::from(raw);
        }
        match self.env.string("HOME") {
            Some(home) if !home.is_empty() => format!("{home}{rest}"),
            _ => String::from(raw),
        }
    }

    /// Expand `$NAME` and `${NAME}` references. Unset variables stay literal.
    #[must_use]
    pub fn expand_vars(&self, raw: &str) -> String {
        let mut expanded = String::with_capacity(raw.len());
        let mut rest = raw;

        while let Some(position) = rest.find('$') {
            let (literal, reference) = rest.split_at(position);
            expanded.push_str(literal);

            let (name, consumed) = parse_variable_reference(reference);
            let value = (!name.is_empty())
                .then(|| self.env.string(name))
                .flatten();
            let literal_reference = reference.get(..consumed).unwrap_or(reference);
            expanded.push_str(value.as_deref().unwrap_or(literal_reference));
            rest = reference.get(consumed..).unwrap_or_default();
        }

        expanded.push_str(rest);
        expanded
    }

    /// Expand user and variable references, in that order.
    #[must_use]
    pub fn expand(&self, raw: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(self.expand_vars(&self.expand_user(raw)))
    }

    /// Resolve the release root from an explicit value or `LOCALRT`.
    ///
    /// The result is expanded, made absolute against `cwd`, and lexically
    /// normalised so it is suitable for fingerprinting.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReleaseNotConfigured` when no explicit release is
    /// given and `LOCALRT` is unset or empty.
    pub fn resolve_release(&self, explicit: Option<&str>, cwd: &Utf8Path) -> Result<Utf8PathBuf> {
        let raw = explicit
            .filter(|value| !value.is_empty())
            .map(String::from)
            .or_else(|| {
                self.env
                    .string(RELEASE_ENV_VAR)
                    .filter(|value| !value.is_empty())
            })
            .ok_or(ConfigError::ReleaseNotConfigured)?;

        Ok(absolutize(&self.expand(&raw), cwd))
    }
}

/// Split a `$NAME` or `${NAME}` reference into the name and bytes consumed.
fn parse_variable_reference(reference: &str) -> (&str, usize) {
    let body = reference.get(1..).unwrap_or_default();
    if let Some(braced) = body.strip_prefix('{') {
        return braced
            .find('}')
            .and_then(|end| braced.get(..end).map(|name| (name, end + 3)))
            .unwrap_or(("", 1));
    }

    let length = body
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map_or(body.len(), |(index, _)| index);
    (body.get(..length).unwrap_or_default(), length + 1)
}

/// Join `path` onto `cwd` when relative and collapse `.` and `..` segments.
///
/// No symlinks are resolved, so the result names the path the user gave.
#[must_use]
pub fn absolutize(path: &Utf8Path, cwd: &Utf8Path) -> Utf8PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut normalized = Utf8PathBuf::new();
    for component in joined.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_str()),
        }
    }
    normalized
}

/// The current working directory as a UTF-8 path.
///
/// # Errors
///
/// Returns `FilesystemError::IoError` when the directory cannot be read or is
/// not valid UTF-8.
pub fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir()
        .map_err(|error| FilesystemError::from_io(".", &error))?;
    Utf8PathBuf::from_path_buf(cwd).map_err(|path| {
        FilesystemError::IoError {
            path,
            message: String::from("working directory is not valid UTF-8"),
        }
        .into()
    })
}

/// Identity of a local release: where it lives, what it targets, which version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    release_path: Utf8PathBuf,
    architecture: String,
    version: String,
}

impl ReleaseDescriptor {
    /// Inspect the release rooted at `release_path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReleaseNotFound` when the root does not exist,
    /// `ConfigError::UndeterminedArchitecture` unless exactly one platform
    /// entry exists, `ConfigError::MissingVersion` when the version key is
    /// absent, and `FilesystemError` for other I/O failures.
    pub fn discover(release_path: &Utf8Path, arch_prefixes: &[String]) -> Result<Self> {
        let release_dir = open_release(release_path)?;
        let architecture = discover_architecture(&release_dir, release_path, arch_prefixes)?;
        let version = discover_version(&release_dir, release_path)?;

        Ok(Self {
            release_path: release_path.to_path_buf(),
            architecture,
            version,
        })
    }

    /// Build a descriptor from already known parts.
    #[must_use]
    pub fn new(
        release_path: impl Into<Utf8PathBuf>,
        architecture: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            release_path: release_path.into(),
            architecture: architecture.into(),
            version: version.into(),
        }
    }

    /// Release root.
    #[must_use]
    pub fn release_path(&self) -> &Utf8Path {
        &self.release_path
    }

    /// Platform tag, e.g. `slc6_amd64_gcc700`.
    #[must_use]
    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    /// Release version, e.g. `CMSSW_10_2_3`.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Deterministic sandbox file name for this release.
    #[must_use]
    pub fn archive_file_name(&self) -> String {
        super::naming::archive_file_name(&self.version, &self.architecture, &self.release_path)
    }
}

/// Open the release root as a capability handle.
pub(super) fn open_release(release_path: &Utf8Path) -> Result<Dir> {
    Dir::open_ambient_dir(release_path, ambient_authority()).map_err(|error| {
        if error.kind() == io::ErrorKind::NotFound {
            ConfigError::ReleaseNotFound {
                path: release_path.as_std_path().to_path_buf(),
            }
            .into()
        } else {
            FilesystemError::from_io(release_path.as_std_path(), &error).into()
        }
    })
}

fn discover_architecture(
    release_dir: &Dir,
    release_path: &Utf8Path,
    arch_prefixes: &[String],
) -> Result<String> {
    let metadata_path = release_path.join(METADATA_DIR);
    let undetermined = |candidates: Vec<String>| ConfigError::UndeterminedArchitecture {
        path: metadata_path.as_std_path().to_path_buf(),
        candidates,
    };

    let metadata_dir = match release_dir.open_dir(METADATA_DIR) {
        Ok(dir) => dir,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            return Err(undetermined(vec![]).into());
        }
        Err(error) => {
            return Err(FilesystemError::from_io(metadata_path.as_std_path(), &error).into());
        }
    };

    let mut candidates = architecture_candidates(&metadata_dir, arch_prefixes)
        .map_err(|error| FilesystemError::from_io(metadata_path.as_std_path(), &error))?;
    candidates.sort_unstable();

    match candidates.as_slice() {
        [single] => Ok(single.clone()),
        _ => Err(undetermined(candidates).into()),
    }
}

fn architecture_candidates(metadata_dir: &Dir, arch_prefixes: &[String]) -> io::Result<Vec<String>> {
    let mut candidates = vec![];
    for entry_result in metadata_dir.entries()? {
        let file_name = entry_result?.file_name()?;
        if arch_prefixes
            .iter()
            .any(|prefix| file_name.starts_with(prefix.as_str()))
        {
            candidates.push(file_name);
        }
    }
    Ok(candidates)
}

fn discover_version(release_dir: &Dir, release_path: &Utf8Path) -> Result<String> {
    let environment_path = release_path.join(METADATA_DIR).join(ENVIRONMENT_FILE);
    let contents = release_dir
        .read_to_string(Utf8Path::new(METADATA_DIR).join(ENVIRONMENT_FILE))
        .map_err(|error| FilesystemError::from_io(environment_path.as_std_path(), &error))?;

    parse_environment_value(&contents, VERSION_KEY).ok_or_else(|| {
        ConfigError::MissingVersion {
            path: environment_path.as_std_path().to_path_buf(),
            key: String::from(VERSION_KEY),
        }
        .into()
    })
}

/// Find `key` in `KEY=VALUE` lines. Lines without `=` are ignored.
#[must_use]
pub fn parse_environment_value(contents: &str, key: &str) -> Option<String> {
    contents
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .find(|(candidate, _)| candidate.trim() == key)
        .map(|(_, value)| String::from(value.trim()))
}
