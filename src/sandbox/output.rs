//! Output directory handling with write-then-rename publication.

use std::fs::File;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use tempfile::Builder;

use crate::error::{FilesystemError, Result};

/// Suffix of files still being written.
pub(crate) const PARTIAL_SUFFIX: &str = ".partial";

/// A directory that receives finished sandboxes.
///
/// Each write goes to its own uniquely named `<name>.<random>.partial` file
/// and is renamed only once complete, so a file under its final name is
/// always whole, even with several writers of the same name.
pub(crate) struct OutputDir {
    path: Utf8PathBuf,
    dir: Dir,
}

impl OutputDir {
    /// Open `path`, creating it and any missing parents.
    pub(crate) fn open_or_create(path: &Utf8Path) -> Result<Self> {
        Dir::create_ambient_dir_all(path, ambient_authority())
            .and_then(|()| Dir::open_ambient_dir(path, ambient_authority()))
            .map(|dir| Self {
                path: path.to_path_buf(),
                dir,
            })
            .map_err(|error| FilesystemError::from_io(path.as_std_path(), &error).into())
    }

    pub(crate) fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Whether a finished file called `file_name` exists.
    pub(crate) fn contains(&self, file_name: &str) -> Result<bool> {
        match self.dir.metadata(file_name) {
            Ok(_) => Ok(true),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => {
                Err(FilesystemError::from_io(self.path.join(file_name).as_std_path(), &error).into())
            }
        }
    }

    /// Write `file_name` through `write`, publishing it only on success.
    ///
    /// `write` receives the open partial file and hands it back once every
    /// byte is written; the file is synced before the rename. On failure the
    /// partial file is removed. Concurrent writers never share a partial
    /// file, and the last rename wins.
    pub(crate) fn write_atomically<F>(&self, file_name: &str, write: F) -> Result<Utf8PathBuf>
    where
        F: FnOnce(File) -> io::Result<File>,
    {
        let final_path = self.path.join(file_name);

        let (file, partial_path) = Builder::new()
            .prefix(&format!("{file_name}."))
            .suffix(PARTIAL_SUFFIX)
            .tempfile_in(&self.path)
            .map_err(|error| FilesystemError::from_io(self.path.as_std_path(), &error))?
            .into_parts();

        // Dropping `partial_path` on any error removes the partial file.
        write(file)
            .and_then(|written| written.sync_all())
            .and_then(|()| {
                partial_path
                    .persist(&final_path)
                    .map_err(|persist_error| persist_error.error)
            })
            .map_err(|error| FilesystemError::from_io(final_path.as_std_path(), &error))?;

        Ok(final_path)
    }

    /// Copy `source` into this directory under its own file name, keeping
    /// its permissions and modification time.
    ///
    /// Copying a file onto itself is a no-op.
    pub(crate) fn copy_in(&self, source: &Utf8Path, file_name: &str) -> Result<Utf8PathBuf> {
        let destination = self.path.join(file_name);
        if is_same_file(source, &destination) {
            return Ok(destination);
        }

        let source_error = |error: io::Error| FilesystemError::from_io(source.as_std_path(), &error);
        let mut source_file = open_ambient_file(source).map_err(source_error)?;
        let metadata = std::fs::metadata(source.as_std_path()).map_err(source_error)?;
        let modified = metadata.modified().map_err(source_error)?;
        let permissions = metadata.permissions();

        self.write_atomically(file_name, |mut file| {
            io::copy(&mut source_file, &mut file)?;
            file.flush()?;
            file.set_permissions(permissions)?;
            file.set_modified(modified)?;
            Ok(file)
        })
    }
}

fn open_ambient_file(path: &Utf8Path) -> io::Result<cap_std::fs_utf8::File> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(&current_dir);
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other(format!("'{path}' does not name a file")))?;

    Dir::open_ambient_dir(parent, ambient_authority())?.open(file_name)
}

fn is_same_file(left: &Utf8Path, right: &Utf8Path) -> bool {
    match (left.canonicalize_utf8(), right.canonicalize_utf8()) {
        (Ok(left_resolved), Ok(right_resolved)) => left_resolved == right_resolved,
        _ => false,
    }
}
