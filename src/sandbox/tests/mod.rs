//! Unit tests for sandbox packaging against synthetic release trees.


use std::io::{self, Cursor, Read};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use rstest::fixture;
use tar::EntryType;
use tempfile::TempDir;

use super::*;

pub(super) const VERSION: &str = "CMSSW_10_2_3";
pub(super) const ARCHITECTURE: &str = "slc6_amd64_gcc700";

/// A release laid out the way `scram project` leaves it, plus an output
/// directory, inside one temporary directory.
pub(super) struct ReleaseFixture {
    _temp_dir: TempDir,
    pub(super) root: Utf8PathBuf,
    pub(super) release: Utf8PathBuf,
    pub(super) output: Utf8PathBuf,
}

impl ReleaseFixture {
    pub(super) fn sandbox(&self, inclusion: InclusionSpec) -> Sandbox {
        Sandbox::new(self.release.clone(), inclusion)
    }

    pub(super) fn write(&self, relative: &str, contents: &str) -> io::Result<()> {
        write_file(&self.release.join(relative), contents)
    }

    pub(super) fn mkdir(&self, relative: &str) -> io::Result<()> {
        create_dir(&self.release.join(relative))
    }

    /// Names of regular files in the output directory.
    pub(super) fn output_files(&self) -> io::Result<Vec<String>> {
        let mut names = vec![];
        if !self.output.exists() {
            return Ok(names);
        }
        let dir = Dir::open_ambient_dir(&self.output, ambient_authority())?;
        for entry in dir.entries()? {
            names.push(entry?.file_name()?);
        }
        names.sort_unstable();
        Ok(names)
    }
}

#[fixture]
pub(super) fn release_fixture() -> io::Result<ReleaseFixture> {
    let temp_dir = tempfile::tempdir()
        .map_err(|error| io_error(format!("tempdir creation failed: {error}")))?;
    let root = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).map_err(|path| {
        io_error(format!(
            "tempdir path should be valid UTF-8: {}",
            path.display()
        ))
    })?;

    let fixture = ReleaseFixture {
        release: root.join(VERSION),
        output: root.join("sandboxes"),
        root,
        _temp_dir: temp_dir,
    };

    fixture.mkdir(&format!(".SCRAM/{ARCHITECTURE}"))?;
    fixture.write(
        ".SCRAM/Environment",
        &format!("SCRAM_PROJECTNAME=CMSSW\nSCRAM_PROJECTVERSION={VERSION}\n"),
    )?;
    fixture.write(&format!("bin/{ARCHITECTURE}/cmsRun"), "#!/bin/sh\n")?;
    fixture.write(&format!("lib/{ARCHITECTURE}/libFooBar.so"), "ELF")?;
    fixture.write("python/Foo/Bar/__init__.py", "")?;
    fixture.write("src/Foo/Bar/data/calibration.txt", "0.98\n")?;
    fixture.write("src/Foo/Bar/python/bar_cfg.py", "process = None\n")?;
    fixture.write("src/Foo/Bar/interface/Bar.h", "#pragma once\n")?;
    fixture.write("src/Foo/Bar/plugins/BarProducer.cc", "// producer\n")?;
    fixture.write("src/Foo/Bar/python/CVS/Entries", "D\n")?;
    fixture.write("src/Foo/.git/config", "[core]\n")?;
    fixture.write("tmp/build.log", "compiling\n")?;

    Ok(fixture)
}

/// A member read back from a packaged sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct ArchiveMember {
    pub(super) path: Utf8PathBuf,
    pub(super) entry_type: EntryType,
    pub(super) link_name: Option<Utf8PathBuf>,
}

pub(super) fn read_members(archive_path: &Utf8Path) -> io::Result<Vec<ArchiveMember>> {
    let bytes = std::fs::read(archive_path)?;
    let mut decoded = vec![];
    bzip2::read::BzDecoder::new(Cursor::new(bytes)).read_to_end(&mut decoded)?;

    let mut archive = tar::Archive::new(Cursor::new(decoded));
    let mut members = vec![];
    for entry_result in archive.entries()? {
        let entry = entry_result?;
        let path = Utf8PathBuf::from(entry.path()?.to_string_lossy().into_owned());
        let link_name = entry
            .link_name()?
            .map(|target| Utf8PathBuf::from(target.to_string_lossy().into_owned()));
        members.push(ArchiveMember {
            path,
            entry_type: entry.header().entry_type(),
            link_name,
        });
    }
    Ok(members)
}

pub(super) fn member_paths(archive_path: &Utf8Path) -> io::Result<Vec<String>> {
    Ok(read_members(archive_path)?
        .into_iter()
        .map(|member| String::from(member.path.as_str().trim_end_matches('/')))
        .collect())
}

pub(super) fn create_dir(path: &Utf8Path) -> io::Result<()> {
    Dir::create_ambient_dir_all(path, ambient_authority()).map_err(|error| {
        io_error(format!(
            "directory creation should succeed for '{path}': {error}"
        ))
    })
}

pub(super) fn write_file(path: &Utf8Path, contents: &str) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io_error("file path should include a parent directory"))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| io_error("file path should include a file name"))?;
    create_dir(parent)?;
    let parent_dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|error| {
        io_error(format!(
            "parent directory should be openable for '{parent}': {error}"
        ))
    })?;
    parent_dir
        .write(file_name, contents)
        .map_err(|error| io_error(format!("file write should succeed for '{path}': {error}")))
}

pub(super) fn io_error(message: impl Into<String>) -> io::Error {
    io::Error::other(message.into())
}
