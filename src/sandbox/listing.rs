//! Sorted directory listings shared by selection and archive assembly.

use std::io;

use cap_std::fs::FileType;
use cap_std::fs_utf8::Dir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum EntryKind {
    Directory,
    File,
    Symlink,
    Other,
}

impl EntryKind {
    /// Classify without following symbolic links.
    pub(super) fn from_file_type(file_type: FileType) -> Self {
        if file_type.is_symlink() {
            Self::Symlink
        } else if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_file() {
            Self::File
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SortedEntry {
    pub(super) file_name: String,
    pub(super) entry_kind: EntryKind,
}

/// List `directory` in byte order of file names so archives are reproducible.
pub(super) fn sorted_entries(directory: &Dir) -> io::Result<Vec<SortedEntry>> {
    let mut entries = vec![];

    for entry_result in directory.entries()? {
        let entry = entry_result?;
        let file_name = entry.file_name()?;
        let entry_kind = EntryKind::from_file_type(entry.file_type()?);

        entries.push(SortedEntry {
            file_name,
            entry_kind,
        });
    }

    entries.sort_unstable_by(|left, right| left.file_name.cmp(&right.file_name));
    Ok(entries)
}
