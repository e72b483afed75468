//! Inclusion policy: which release entries go into a sandbox, and which
//! paths are filtered out while walking them.
//!
//! Selection runs to completion before any archive byte is written, so the
//! resulting entry list can be inspected and tested without archive I/O.

use std::io;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use cap_std::fs_utf8::Dir;
use glob::Pattern;

use super::listing::{EntryKind, sorted_entries};
use super::release::METADATA_DIR;
use crate::error::ConfigError;

/// Release-level entries packaged into every sandbox when present.
pub const FIXED_ENTRIES: &[&str] = &[METADATA_DIR, "bin", "cfipython", "external", "lib", "python"];

/// Release subtree holding checked-out packages.
pub const SOURCE_DIR: &str = "src";

/// Package subdirectories discovered anywhere under [`SOURCE_DIR`].
pub const PACKAGED_SUBDIRS: &[&str] = &["data", "python", "interface"];

/// Version-control directory name excluded from sandboxes.
pub const VERSION_CONTROL_DIR: &str = "CVS";

/// Separator between source and archive name in rename specifications.
pub const RENAME_SEPARATOR: &str = "->";

/// A release entry and the name it takes inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeEntry {
    source: Utf8PathBuf,
    archive_name: Utf8PathBuf,
}

impl IncludeEntry {
    /// Include `source` under its own relative path.
    #[must_use]
    pub fn new(source: impl Into<Utf8PathBuf>) -> Self {
        let path = source.into();
        Self {
            archive_name: path.clone(),
            source: path,
        }
    }

    /// Include `source` under `archive_name`.
    #[must_use]
    pub fn renamed(source: impl Into<Utf8PathBuf>, archive_name: impl Into<Utf8PathBuf>) -> Self {
        Self {
            source: source.into(),
            archive_name: archive_name.into(),
        }
    }

    /// Parse `path` or `path->archive/name`, trimming whitespace around both.
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        spec.split_once(RENAME_SEPARATOR).map_or_else(
            || Self::new(spec.trim()),
            |(source, archive_name)| Self::renamed(source.trim(), archive_name.trim()),
        )
    }

    /// Path relative to the release root (or `src` for user includes).
    #[must_use]
    pub fn source(&self) -> &Utf8Path {
        &self.source
    }

    /// Path relative to the sandbox version root.
    #[must_use]
    pub fn archive_name(&self) -> &Utf8Path {
        &self.archive_name
    }

    fn is_straight(&self) -> bool {
        self.source == self.archive_name
    }

    /// Whether this entry is already packaged as part of `ancestor`.
    fn is_covered_by(&self, ancestor: &Self) -> bool {
        if self == ancestor {
            return true;
        }
        self.is_straight() && ancestor.is_straight() && self.source.starts_with(&ancestor.source)
    }
}

/// Build the ordered list of release entries to package.
///
/// Order: fixed release entries, user includes (resolved under `src`), then
/// every `data`, `python` and `interface` directory found under `src`.
/// Entries already contained in an earlier straight entry are dropped so the
/// archive holds no duplicate members.
///
/// `release_root` is the ambient path of `release_dir`, used to resolve
/// symbolic links that point outside the release.
///
/// # Errors
///
/// Returns an `io::Error` when the source tree cannot be walked.
pub fn select_entries(
    release_dir: &Dir,
    release_root: &Utf8Path,
    includes: &[IncludeEntry],
) -> io::Result<Vec<IncludeEntry>> {
    let source_root = Utf8Path::new(SOURCE_DIR);

    let fixed = FIXED_ENTRIES.iter().map(|name| IncludeEntry::new(*name));
    let user = includes.iter().map(|include| {
        let archive_name = if include.is_straight() {
            source_root.join(include.archive_name())
        } else {
            include.archive_name().to_path_buf()
        };
        IncludeEntry::renamed(source_root.join(include.source()), archive_name)
    });

    let mut candidates: Vec<IncludeEntry> = fixed.chain(user).collect();
    candidates.extend(discover_packaged_subdirs(release_dir, release_root)?);

    Ok(drop_covered(candidates))
}

/// Find every `src/**/{data,python,interface}` directory, parents first.
///
/// A symbolic link with one of those names counts when its target is a
/// directory; it is packaged as a link and never descended into.
///
/// # Errors
///
/// Returns an `io::Error` when a directory under `src` cannot be read.
pub fn discover_packaged_subdirs(
    release_dir: &Dir,
    release_root: &Utf8Path,
) -> io::Result<Vec<IncludeEntry>> {
    let source_dir = match release_dir.open_dir(SOURCE_DIR) {
        Ok(dir) => dir,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
        Err(error) => return Err(error),
    };

    let mut found = vec![];
    let walker = SourceWalker { release_root };
    walker.walk(&source_dir, Utf8Path::new(SOURCE_DIR), &mut found)?;
    Ok(found)
}

struct SourceWalker<'a> {
    release_root: &'a Utf8Path,
}

impl SourceWalker<'_> {
    fn walk(
        &self,
        current_dir: &Dir,
        current_relative_path: &Utf8Path,
        found: &mut Vec<IncludeEntry>,
    ) -> io::Result<()> {
        let entries = sorted_entries(current_dir)?;
        let subdirectories: Vec<&str> = entries
            .iter()
            .filter(|entry| entry.entry_kind == EntryKind::Directory)
            .map(|entry| entry.file_name.as_str())
            .collect();
        let linked_directories: Vec<&str> = entries
            .iter()
            .filter(|entry| entry.entry_kind == EntryKind::Symlink)
            .map(|entry| entry.file_name.as_str())
            .filter(|name| PACKAGED_SUBDIRS.contains(name))
            .filter(|name| self.links_to_directory(&current_relative_path.join(name)))
            .collect();

        for packaged in PACKAGED_SUBDIRS {
            if subdirectories.contains(packaged) || linked_directories.contains(packaged) {
                found.push(IncludeEntry::new(current_relative_path.join(packaged)));
            }
        }

        for name in subdirectories {
            let child_dir = current_dir.open_dir(name)?;
            self.walk(&child_dir, &current_relative_path.join(name), found)?;
        }

        Ok(())
    }

    /// Follows the link ambiently; a dangling link is not a directory.
    fn links_to_directory(&self, relative_path: &Utf8Path) -> bool {
        std::fs::metadata(self.release_root.join(relative_path).as_std_path())
            .is_ok_and(|metadata| metadata.is_dir())
    }
}

fn drop_covered(candidates: Vec<IncludeEntry>) -> Vec<IncludeEntry> {
    let mut selected: Vec<IncludeEntry> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if !selected.iter().any(|kept| candidate.is_covered_by(kept)) {
            selected.push(candidate);
        }
    }
    selected
}

/// Exclusion rules applied to every path while archiving.
#[derive(Debug, Clone, Default)]
pub struct PackingFilter {
    blacklist: Vec<Pattern>,
}

impl PackingFilter {
    /// Compile the blacklist globs.
    ///
    /// A pattern that is not a valid glob, such as `[unclosed`, matches its
    /// own text literally.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPattern` if even the literal form fails
    /// to compile.
    pub fn new(blacklist: &[String]) -> Result<Self, ConfigError> {
        let patterns = blacklist
            .iter()
            .map(|pattern| {
                Pattern::new(pattern)
                    .or_else(|_| Pattern::new(&Pattern::escape(pattern)))
                    .map_err(|error| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        message: error.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            blacklist: patterns,
        })
    }

    /// Whether the release-relative `path` must be left out of the archive.
    ///
    /// `is_dir` tells whether the final component is a directory, which
    /// matters for `CVS` (a file named `CVS` is kept).
    #[must_use]
    pub fn excludes(&self, path: &Utf8Path, is_dir: bool) -> bool {
        is_hidden(path)
            || is_version_control(path, is_dir)
            || path
                .file_name()
                .is_some_and(|name| matches_blacklist(name, &self.blacklist))
    }
}

/// A path is hidden when any segment starts with `.`, except `.SCRAM`.
#[must_use]
pub fn is_hidden(path: &Utf8Path) -> bool {
    normal_segments(path).any(|segment| segment.starts_with('.') && segment != METADATA_DIR)
}

/// A path is version-controlled bookkeeping when it runs through `CVS/`.
#[must_use]
pub fn is_version_control(path: &Utf8Path, is_dir: bool) -> bool {
    let segments: Vec<&str> = normal_segments(path).collect();
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    parents.contains(&VERSION_CONTROL_DIR) || (is_dir && *last == VERSION_CONTROL_DIR)
}

/// Whether `file_name` matches any blacklist glob.
#[must_use]
pub fn matches_blacklist(file_name: &str, blacklist: &[Pattern]) -> bool {
    blacklist.iter().any(|pattern| pattern.matches(file_name))
}

fn normal_segments(path: &Utf8Path) -> impl Iterator<Item = &str> {
    path.components().filter_map(|component| match component {
        Utf8Component::Normal(segment) => Some(segment),
        _ => None,
    })
}
