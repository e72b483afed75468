//! Shared behavioural-test state for sandbox packaging scenarios.

use std::sync::Arc;

use camino::Utf8PathBuf;
use cmssw_sandbox::sandbox::PackagedSandbox;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tempfile::TempDir;

/// Step result type for sandbox packaging BDD tests.
pub type StepResult<T> = Result<T, String>;

/// Temporary directory holding the release, pre-built sandboxes and outputs.
#[derive(Clone)]
pub struct Workspace {
    /// Keeps the temporary directory alive for the full scenario.
    pub(crate) _temp_dir: Arc<TempDir>,

    /// UTF-8 path to the workspace root.
    pub(crate) root: Utf8PathBuf,
}

impl Workspace {
    /// Create a new temporary workspace for a scenario.
    pub(crate) fn new() -> StepResult<Self> {
        let temp_dir = tempfile::tempdir()
            .map_err(|error| format!("failed to create temporary workspace: {error}"))?;

        let root = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf())
            .map_err(|_| String::from("temporary workspace path should be valid UTF-8"))?;

        Ok(Self {
            _temp_dir: Arc::new(temp_dir),
            root,
        })
    }

    /// Directory sandboxes are packaged into.
    pub(crate) fn output_dir(&self) -> Utf8PathBuf {
        self.root.join("sandboxes")
    }

    /// Directory staged copies are placed in.
    pub(crate) fn stage_dir(&self) -> Utf8PathBuf {
        self.root.join("stage")
    }
}

/// High-level outcome observed after a packaging attempt.
#[derive(Clone)]
pub enum PackagingOutcome {
    /// Packaging produced (or reused) a sandbox.
    Packaged(PackagedSandbox),

    /// Packaging failed with a classified failure kind.
    Failed {
        /// The failure category.
        kind: FailureKind,
        /// Human-readable error message.
        message: String,
    },
}

/// Categorised failure outcomes for assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// More or fewer than one platform entry under `.SCRAM`.
    UndeterminedArchitecture,
    /// The recycle path does not follow the sandbox naming scheme.
    UnrecognisedRecycleName,
    /// Any other failure.
    Other,
}

/// Shared scenario state for sandbox packaging behavioural tests.
#[derive(Default, ScenarioState)]
pub struct SandboxPackagingState {
    /// Scenario-scoped workspace.
    pub(crate) workspace: Slot<Workspace>,

    /// Root of the synthetic release under test.
    pub(crate) release: Slot<Utf8PathBuf>,

    /// Basename globs to leave out.
    pub(crate) blacklist: Slot<Vec<String>>,

    /// Pre-built sandbox to recycle.
    pub(crate) recycle: Slot<Utf8PathBuf>,

    /// Outcome of the most recent packaging attempt.
    pub(crate) outcome: Slot<PackagingOutcome>,

    /// Path of the staged copy, once staged.
    pub(crate) staged_path: Slot<Utf8PathBuf>,
}

/// Fixture providing fresh state for each sandbox packaging scenario.
#[fixture]
pub fn sandbox_packaging_state() -> SandboxPackagingState {
    let state = SandboxPackagingState::default();
    state.blacklist.set(vec![]);
    state
}
