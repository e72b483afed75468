//! bzip2-compressed tar assembly for release sandboxes.

use std::io::{self, Read, Write};
use std::time::UNIX_EPOCH;

use bzip2::Compression;
use bzip2::write::BzEncoder;
use camino::Utf8Path;
use cap_std::fs::Metadata;
use cap_std::fs_utf8::Dir;
use tar::{Builder, EntryType, Header};
use tracing::{debug, trace};

use super::listing::{EntryKind, sorted_entries};
use super::selection::{IncludeEntry, PackingFilter};

const DEFAULT_DIRECTORY_MODE: u32 = 0o755;
const DEFAULT_FILE_MODE: u32 = 0o644;
const SYMLINK_MODE: u32 = 0o777;

/// Streams selected release entries into a tar archive.
///
/// Every member lands under `<version>/<archive name>`, the layout the remote
/// environment builder unpacks.
pub(super) struct SandboxArchiver<'a> {
    release_root: &'a Utf8Path,
    release_dir: &'a Dir,
    filter: &'a PackingFilter,
    version: &'a str,
}

impl<'a> SandboxArchiver<'a> {
    pub(super) const fn new(
        release_root: &'a Utf8Path,
        release_dir: &'a Dir,
        filter: &'a PackingFilter,
        version: &'a str,
    ) -> Self {
        Self {
            release_root,
            release_dir,
            filter,
            version,
        }
    }

    /// Compress the selected entries into `sink` and return the sink.
    pub(super) fn write_bzip2<W: Write>(&self, sink: W, entries: &[IncludeEntry]) -> io::Result<W> {
        let encoder = BzEncoder::new(sink, Compression::best());
        let mut builder = Builder::new(encoder);

        self.append_entries(&mut builder, entries)?;

        builder.into_inner()?.finish()
    }

    fn append_entries<W: Write>(
        &self,
        builder: &mut Builder<W>,
        entries: &[IncludeEntry],
    ) -> io::Result<()> {
        for entry in entries {
            let Some(entry_kind) = self.top_level_kind(entry.source())? else {
                trace!(entry = %entry.source(), "skipping missing entry");
                continue;
            };

            debug!(entry = %entry.source(), "packing");
            let archive_path = Utf8Path::new(self.version).join(entry.archive_name());
            self.append_top_level(builder, entry.source(), entry_kind, &archive_path)?;
        }
        Ok(())
    }

    /// Classify a release-relative path, or `None` when it does not exist.
    fn top_level_kind(&self, source: &Utf8Path) -> io::Result<Option<EntryKind>> {
        match self.release_dir.symlink_metadata(source) {
            Ok(metadata) => Ok(Some(EntryKind::from_file_type(metadata.file_type()))),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn append_top_level<W: Write>(
        &self,
        builder: &mut Builder<W>,
        source: &Utf8Path,
        entry_kind: EntryKind,
        archive_path: &Utf8Path,
    ) -> io::Result<()> {
        let file_name = source
            .file_name()
            .ok_or_else(|| io::Error::other(format!("entry '{source}' has no file name")))?;

        let opened;
        let parent_dir = match source.parent().filter(|parent| !parent.as_str().is_empty()) {
            Some(parent) => {
                opened = self.release_dir.open_dir(parent)?;
                &opened
            }
            None => self.release_dir,
        };

        self.append_entry(builder, parent_dir, file_name, entry_kind, source, archive_path)
    }

    fn append_entry<W: Write>(
        &self,
        builder: &mut Builder<W>,
        parent_dir: &Dir,
        file_name: &str,
        entry_kind: EntryKind,
        source_path: &Utf8Path,
        archive_path: &Utf8Path,
    ) -> io::Result<()> {
        if self
            .filter
            .excludes(source_path, entry_kind == EntryKind::Directory)
        {
            trace!(path = %source_path, "excluded by packing filter");
            return Ok(());
        }

        match entry_kind {
            EntryKind::Directory => {
                let metadata = parent_dir.metadata(file_name)?;
                append_directory_header(builder, archive_path, &metadata)?;
                let child_dir = parent_dir.open_dir(file_name)?;
                self.append_directory_contents(builder, &child_dir, source_path, archive_path)
            }
            EntryKind::File => append_file(builder, parent_dir, file_name, archive_path),
            EntryKind::Symlink => {
                let metadata = parent_dir.symlink_metadata(file_name)?;
                let target = std::fs::read_link(self.release_root.join(source_path))?;
                append_symlink(builder, archive_path, &target, &metadata)
            }
            EntryKind::Other => Ok(()),
        }
    }

    fn append_directory_contents<W: Write>(
        &self,
        builder: &mut Builder<W>,
        current_dir: &Dir,
        source_path: &Utf8Path,
        archive_path: &Utf8Path,
    ) -> io::Result<()> {
        for entry in sorted_entries(current_dir)? {
            self.append_entry(
                builder,
                current_dir,
                &entry.file_name,
                entry.entry_kind,
                &source_path.join(&entry.file_name),
                &archive_path.join(&entry.file_name),
            )?;
        }
        Ok(())
    }
}

fn append_directory_header<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &Utf8Path,
    metadata: &Metadata,
) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    header.set_mode(metadata_mode(metadata, DEFAULT_DIRECTORY_MODE));
    header.set_mtime(metadata_mtime(metadata));
    header.set_cksum();

    let path = format!("{}/", normalize_archive_path(archive_path));
    builder.append_data(&mut header, path, io::empty())
}

fn append_file<W: Write>(
    builder: &mut Builder<W>,
    parent_dir: &Dir,
    file_name: &str,
    archive_path: &Utf8Path,
) -> io::Result<()> {
    let metadata = parent_dir.metadata(file_name)?;
    let file = parent_dir.open(file_name)?;

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_mode(metadata_mode(&metadata, DEFAULT_FILE_MODE));
    header.set_mtime(metadata_mtime(&metadata));

    append_sized(builder, &mut header, archive_path, metadata.len(), file)
}

/// Append exactly `size` bytes of `contents`.
///
/// Bytes appended to a file after its size was read stay out of the member;
/// a file that shrank fails instead of desynchronising the stream.
fn append_sized<W: Write, R: Read>(
    builder: &mut Builder<W>,
    header: &mut Header,
    archive_path: &Utf8Path,
    size: u64,
    contents: R,
) -> io::Result<()> {
    header.set_size(size);
    header.set_cksum();
    let exact = ExactReader {
        inner: contents.take(size),
        remaining: size,
    };
    builder.append_data(header, normalize_archive_path(archive_path), exact)
}

/// Reads exactly `remaining` bytes, failing on an early end of input.
struct ExactReader<R> {
    inner: io::Take<R>,
    remaining: u64,
}

impl<R: Read> Read for ExactReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        if count == 0 && self.remaining > 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shrank by {} bytes while being archived", self.remaining),
            ));
        }
        self.remaining = self
            .remaining
            .saturating_sub(u64::try_from(count).unwrap_or(u64::MAX));
        Ok(count)
    }
}

fn append_symlink<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &Utf8Path,
    target: &std::path::Path,
    metadata: &Metadata,
) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Symlink);
    header.set_size(0);
    header.set_mode(SYMLINK_MODE);
    header.set_mtime(metadata_mtime(metadata));

    builder.append_link(&mut header, normalize_archive_path(archive_path), target)
}

fn normalize_archive_path(path: &Utf8Path) -> String {
    path.as_str().replace('\\', "/")
}

fn metadata_mtime(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|modified| modified.into_std().duration_since(UNIX_EPOCH).ok())
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(unix)]
fn metadata_mode(metadata: &Metadata, _fallback: u32) -> u32 {
    use cap_std::fs::PermissionsExt;

    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn metadata_mode(_metadata: &Metadata, fallback: u32) -> u32 {
    fallback
}
