//! Per-target build records.
//!
//! Each target gets exactly one [`BuildRecord`] per evaluation, created on
//! first need. The record moves from not-started to running to a terminal
//! state exactly once; anyone who finds it running waits on its latch.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::builder::BuildError;

/// What a succeeded target produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// A single output file.
    File(PathBuf),
    /// The flattened inputs of an aggregate target.
    Aggregate(Vec<PathBuf>),
}

impl Artifact {
    /// Paths contributed to a dependent's inputs.
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            Artifact::File(path) => std::slice::from_ref(path),
            Artifact::Aggregate(paths) => paths,
        }
    }
}

/// State of a target within one evaluation.
#[derive(Debug, Clone)]
pub enum BuildState {
    NotStarted,
    Running,
    Succeeded(Artifact),
    Failed(Arc<BuildError>),
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Succeeded(_) | BuildState::Failed(_))
    }
}

/// A build state guarded by a completion latch.
#[derive(Debug)]
pub struct BuildRecord {
    state: Mutex<BuildState>,
    done: Condvar,
}

impl Default for BuildRecord {
    fn default() -> Self {
        BuildRecord {
            state: Mutex::new(BuildState::NotStarted),
            done: Condvar::new(),
        }
    }
}

impl BuildRecord {
    fn lock(&self) -> MutexGuard<'_, BuildState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the record for execution. Returns false if someone else already
    /// started it.
    pub fn try_start(&self) -> bool {
        let mut state = self.lock();
        if matches!(*state, BuildState::NotStarted) {
            *state = BuildState::Running;
            true
        } else {
            false
        }
    }

    pub fn succeed(&self, artifact: Artifact) {
        self.finish(BuildState::Succeeded(artifact));
    }

    pub fn fail(&self, error: Arc<BuildError>) {
        self.finish(BuildState::Failed(error));
    }

    fn finish(&self, terminal: BuildState) {
        let mut state = self.lock();
        if state.is_terminal() {
            tracing::warn!("build record finished twice; keeping the first result");
            return;
        }
        *state = terminal;
        self.done.notify_all();
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> BuildState {
        self.lock().clone()
    }

    /// Block until the record leaves the running state.
    pub fn wait(&self) -> BuildState {
        let mut state = self.lock();
        while matches!(*state, BuildState::Running) {
            state = self.done.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.clone()
    }

    /// The artifact, if the target succeeded.
    pub fn artifact(&self) -> Option<Artifact> {
        match &*self.lock() {
            BuildState::Succeeded(artifact) => Some(artifact.clone()),
            _ => None,
        }
    }
}

/// Records memoized by target name.
#[derive(Debug, Default)]
pub struct RecordTable {
    records: Mutex<HashMap<String, Arc<BuildRecord>>>,
}

impl RecordTable {
    pub fn new() -> Self {
        RecordTable::default()
    }

    /// The record for `name`, created on first request.
    pub fn get_or_create(&self, name: &str) -> Arc<BuildRecord> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(records.entry(name.to_string()).or_default())
    }

    /// The record for `name`, if it was ever requested.
    pub fn get(&self, name: &str) -> Option<Arc<BuildRecord>> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
