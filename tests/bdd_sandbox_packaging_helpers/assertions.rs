//! Then-step assertions for sandbox packaging behavioural scenarios.

use std::io::Read;

use camino::Utf8Path;
use cmssw_sandbox::sandbox::{PackagedSandbox, SandboxOrigin};
use rstest_bdd_macros::then;

use super::state::{FailureKind, PackagingOutcome, SandboxPackagingState, StepResult};

#[then("packaging succeeds with version {version} and architecture {architecture}")]
fn packaging_succeeds_with_version_and_architecture(
    sandbox_packaging_state: &SandboxPackagingState,
    version: String,
    architecture: String,
) -> StepResult<()> {
    let packaged = packaged_sandbox(sandbox_packaging_state)?;

    if packaged.version() != version {
        return Err(format!(
            "expected version {version}, got {}",
            packaged.version()
        ));
    }
    if packaged.architecture() != architecture {
        return Err(format!(
            "expected architecture {architecture}, got {}",
            packaged.architecture()
        ));
    }
    Ok(())
}

#[then("the sandbox contains {member}")]
fn the_sandbox_contains(
    sandbox_packaging_state: &SandboxPackagingState,
    member: String,
) -> StepResult<()> {
    let members = sandbox_members(sandbox_packaging_state)?;
    if members.contains(&member) {
        return Ok(());
    }
    Err(format!("expected {member} in sandbox, got {members:?}"))
}

#[then("the sandbox does not contain {member}")]
fn the_sandbox_does_not_contain(
    sandbox_packaging_state: &SandboxPackagingState,
    member: String,
) -> StepResult<()> {
    let members = sandbox_members(sandbox_packaging_state)?;
    if members.contains(&member) {
        return Err(format!("expected {member} to be left out of the sandbox"));
    }
    Ok(())
}

#[then("the sandbox was reused")]
fn the_sandbox_was_reused(sandbox_packaging_state: &SandboxPackagingState) -> StepResult<()> {
    let packaged = packaged_sandbox(sandbox_packaging_state)?;
    if packaged.origin() == SandboxOrigin::Reused {
        return Ok(());
    }
    Err(format!(
        "expected the existing sandbox to be reused, got {:?}",
        packaged.origin()
    ))
}

#[then("the output directory file count is {count}")]
fn the_output_directory_file_count_is(
    sandbox_packaging_state: &SandboxPackagingState,
    count: usize,
) -> StepResult<()> {
    let workspace = sandbox_packaging_state
        .workspace
        .get()
        .ok_or_else(|| String::from("workspace should be set"))?;
    let output_dir = workspace.output_dir();

    let observed = if output_dir.exists() {
        std::fs::read_dir(output_dir.as_std_path())
            .map_err(|error| format!("failed to list {output_dir}: {error}"))?
            .count()
    } else {
        0
    };

    if observed == count {
        return Ok(());
    }
    Err(format!(
        "expected {count} files in {output_dir}, found {observed}"
    ))
}

#[then("packaging fails because the architecture is undetermined")]
fn packaging_fails_because_the_architecture_is_undetermined(
    sandbox_packaging_state: &SandboxPackagingState,
) -> StepResult<()> {
    assert_failure_kind(sandbox_packaging_state, FailureKind::UndeterminedArchitecture)
}

#[then("packaging fails because the recycle name is unrecognised")]
fn packaging_fails_because_the_recycle_name_is_unrecognised(
    sandbox_packaging_state: &SandboxPackagingState,
) -> StepResult<()> {
    assert_failure_kind(sandbox_packaging_state, FailureKind::UnrecognisedRecycleName)
}

#[then("the staged copy matches the packaged sandbox")]
fn the_staged_copy_matches_the_packaged_sandbox(
    sandbox_packaging_state: &SandboxPackagingState,
) -> StepResult<()> {
    let packaged = packaged_sandbox(sandbox_packaging_state)?;
    let staged_path = sandbox_packaging_state
        .staged_path
        .get()
        .ok_or_else(|| String::from("staged path should be set"))?;

    if staged_path.file_name() != packaged.archive_path().file_name() {
        return Err(format!(
            "staged copy {staged_path} should keep the name of {}",
            packaged.archive_path()
        ));
    }

    let staged_bytes = read_bytes(&staged_path)?;
    let packaged_bytes = read_bytes(packaged.archive_path())?;
    if staged_bytes == packaged_bytes {
        return Ok(());
    }
    Err(String::from("staged copy differs from the packaged sandbox"))
}

fn packaged_sandbox(state: &SandboxPackagingState) -> StepResult<PackagedSandbox> {
    let outcome = state
        .outcome
        .get()
        .ok_or_else(|| String::from("packaging outcome should be set"))?;

    match outcome {
        PackagingOutcome::Packaged(packaged) => Ok(packaged),
        PackagingOutcome::Failed { message, .. } => {
            Err(format!("expected packaging to succeed, got: {message}"))
        }
    }
}

fn assert_failure_kind(state: &SandboxPackagingState, expected: FailureKind) -> StepResult<()> {
    let outcome = state
        .outcome
        .get()
        .ok_or_else(|| String::from("packaging outcome should be set"))?;

    match outcome {
        PackagingOutcome::Packaged(packaged) => Err(format!(
            "expected {expected:?} failure, got sandbox {}",
            packaged.archive_path()
        )),
        PackagingOutcome::Failed { kind, message } => {
            if kind == expected {
                return Ok(());
            }
            Err(format!("expected failure kind {expected:?}, got {kind:?}: {message}"))
        }
    }
}

fn read_bytes(path: &Utf8Path) -> StepResult<Vec<u8>> {
    std::fs::read(path.as_std_path()).map_err(|error| format!("failed to read {path}: {error}"))
}

/// Member paths of the packaged sandbox, without trailing slashes.
fn sandbox_members(state: &SandboxPackagingState) -> StepResult<Vec<String>> {
    let packaged = packaged_sandbox(state)?;
    let compressed = read_bytes(packaged.archive_path())?;

    let mut decoded = vec![];
    bzip2::read::BzDecoder::new(compressed.as_slice())
        .read_to_end(&mut decoded)
        .map_err(|error| format!("sandbox should decompress: {error}"))?;

    let mut archive = tar::Archive::new(decoded.as_slice());
    let entries = archive
        .entries()
        .map_err(|error| format!("sandbox should be a tar archive: {error}"))?;

    let mut members = vec![];
    for entry_result in entries {
        let entry = entry_result.map_err(|error| format!("unreadable tar entry: {error}"))?;
        let path = entry
            .path()
            .map_err(|error| format!("unreadable tar entry path: {error}"))?;
        members.push(String::from(path.to_string_lossy().trim_end_matches('/')));
    }
    Ok(members)
}
