//! Parallel graph evaluation.
//!
//! The coordinator runs on the calling thread: it resolves the requested
//! root, releases a target to the worker pool once every target it depends
//! on has succeeded, and collects results over a channel. Each target is
//! built at most once per [`Evaluation`]; its [`BuildRecord`] is created on
//! first need and memoized by name.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::builder::context::BuildContext;
use crate::builder::events::BuildEvent;
use crate::builder::executor::ToolExecutor;
use crate::builder::fingerprint::{FingerprintCache, TargetFingerprint};
use crate::builder::record::{Artifact, BuildRecord, BuildState, RecordTable};
use crate::builder::BuildError;
use crate::core::target::{Input, Target};
use crate::graph::{GraphError, TargetGraph};

type Observer<'a> = Box<dyn Fn(&BuildEvent) + Send + Sync + 'a>;

/// A failed target and the error it failed with.
#[derive(Debug, Clone)]
pub struct TargetFailure {
    pub target: String,
    pub error: Arc<BuildError>,
}

/// Result of evaluating one root target.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    /// Requested root
    pub root: String,
    /// Resolved build order
    pub order: Vec<String>,
    /// Targets whose tool was invoked, in completion order
    pub executed: Vec<String>,
    /// Targets skipped as up to date
    pub fresh: Vec<String>,
    /// Artifacts of every succeeded target
    pub succeeded: BTreeMap<String, Artifact>,
    /// First failure observed
    pub failure: Option<TargetFailure>,
    /// Every failure, in completion order
    pub failures: Vec<TargetFailure>,
    /// Targets never scheduled, with the failed dependency that blocked them
    pub skipped: BTreeMap<String, String>,
    pub duration: Duration,
}

impl EvaluationReport {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn artifact(&self, target: &str) -> Option<&Artifact> {
        self.succeeded.get(target)
    }
}

enum Outcome {
    /// The tool ran.
    Ran(Artifact),
    /// Fingerprint matched; the tool did not run.
    Fresh(Artifact),
    /// Empty target; nothing to run.
    Aggregated(Artifact),
    /// Finished by an earlier or concurrent evaluation.
    Reused(Artifact),
    Failed(Arc<BuildError>),
}

impl Outcome {
    fn artifact(&self) -> Option<&Artifact> {
        match self {
            Outcome::Ran(a) | Outcome::Fresh(a) | Outcome::Aggregated(a) | Outcome::Reused(a) => {
                Some(a)
            }
            Outcome::Failed(_) => None,
        }
    }

    fn from_state(state: BuildState, target: &str) -> Outcome {
        match state {
            BuildState::Succeeded(artifact) => Outcome::Reused(artifact),
            BuildState::Failed(error) => Outcome::Failed(error),
            BuildState::NotStarted | BuildState::Running => {
                Outcome::Failed(Arc::new(BuildError::Script {
                    target: target.to_string(),
                    message: "build record was released without a result".to_string(),
                }))
            }
        }
    }
}

/// One evaluation of a target graph: a record table, a worker pool and the
/// fingerprint cache of the output directory.
pub struct Evaluation<'a> {
    graph: &'a TargetGraph,
    ctx: &'a BuildContext,
    records: RecordTable,
    fingerprints: Mutex<FingerprintCache>,
    pool: rayon::ThreadPool,
    observer: Option<Observer<'a>>,
}

impl<'a> Evaluation<'a> {
    /// Create an evaluation with a pool of `ctx.jobs` workers.
    pub fn new(graph: &'a TargetGraph, ctx: &'a BuildContext) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(ctx.jobs)
            .thread_name(|i| format!("comake-worker-{}", i))
            .build()
            .context("failed to start worker pool")?;

        Ok(Evaluation {
            graph,
            ctx,
            records: RecordTable::new(),
            fingerprints: Mutex::new(FingerprintCache::load_or_default(&ctx.fingerprint_path())),
            pool,
            observer: None,
        })
    }

    /// Receive every build event.
    pub fn with_observer(mut self, observer: impl Fn(&BuildEvent) + Send + Sync + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(observer) = &self.observer {
            observer(&event);
        }
    }

    /// Current state of a target's record.
    pub fn state(&self, target: &str) -> BuildState {
        self.records
            .get(target)
            .map(|record| record.state())
            .unwrap_or(BuildState::NotStarted)
    }

    /// Build `root` and everything it depends on.
    ///
    /// Structural errors are returned before anything runs; build failures
    /// are reported in the [`EvaluationReport`].
    pub fn evaluate(&self, root: &str) -> Result<EvaluationReport, GraphError> {
        let start = Instant::now();
        let order = self.graph.resolve_targets(root)?;
        let targets = self.graph.targets();

        tracing::debug!("evaluating `{}` ({} target(s))", root, order.len());

        let mut waiting: HashMap<usize, usize> = HashMap::new();
        let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
        for &idx in &order {
            let deps: HashSet<&str> = targets[idx].dependencies().collect();
            waiting.insert(idx, deps.len());
            for dep in deps {
                if let Ok(dep_idx) = self.graph.index_of(dep) {
                    dependents.entry(dep_idx).or_default().push(idx);
                }
            }
        }
        let position: HashMap<usize, usize> =
            order.iter().enumerate().map(|(pos, &idx)| (idx, pos)).collect();
        for list in dependents.values_mut() {
            list.sort_by_key(|idx| position[idx]);
        }

        let mut report = EvaluationReport {
            root: root.to_string(),
            order: order.iter().map(|&i| targets[i].name.clone()).collect(),
            executed: Vec::new(),
            fresh: Vec::new(),
            succeeded: BTreeMap::new(),
            failure: None,
            failures: Vec::new(),
            skipped: BTreeMap::new(),
            duration: Duration::ZERO,
        };

        let mut ready: VecDeque<usize> = order
            .iter()
            .copied()
            .filter(|idx| waiting[idx] == 0)
            .collect();

        let (tx, rx) = mpsc::channel::<(usize, Outcome)>();
        let mut pending = 0usize;

        self.pool.in_place_scope(|scope| loop {
            while let Some(idx) = ready.pop_front() {
                let name = targets[idx].name.as_str();
                let record = self.records.get_or_create(name);

                if record.try_start() {
                    let tx = tx.clone();
                    pending += 1;
                    scope.spawn(move |_| {
                        let outcome = self.build_one(&targets[idx], &record);
                        let _ = tx.send((idx, outcome));
                    });
                } else {
                    if matches!(record.state(), BuildState::Running) {
                        tracing::debug!("`{}` is being built elsewhere; waiting", name);
                    }
                    let outcome = Outcome::from_state(record.wait(), name);
                    pending += 1;
                    let _ = tx.send((idx, outcome));
                }
            }

            if pending == 0 {
                break;
            }
            let Ok((idx, outcome)) = rx.recv() else {
                break;
            };
            pending -= 1;

            let name = &targets[idx].name;
            let artifact = match outcome {
                Outcome::Ran(artifact) => {
                    report.executed.push(name.clone());
                    artifact
                }
                Outcome::Fresh(artifact) => {
                    report.fresh.push(name.clone());
                    artifact
                }
                Outcome::Aggregated(artifact) | Outcome::Reused(artifact) => artifact,
                Outcome::Failed(error) => {
                    let failure = TargetFailure {
                        target: name.clone(),
                        error,
                    };
                    if report.failure.is_none() {
                        report.failure = Some(failure.clone());
                    }
                    report.failures.push(failure);
                    self.skip_dependents(idx, &dependents, &mut report.skipped);
                    continue;
                }
            };

            report.succeeded.insert(name.clone(), artifact);
            for &dependent in dependents.get(&idx).into_iter().flatten() {
                if let Some(count) = waiting.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 && !report.skipped.contains_key(&targets[dependent].name) {
                        ready.push_back(dependent);
                    }
                }
            }
        });

        let cache_path = self.ctx.fingerprint_path();
        let cache = self.fingerprints.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = cache.save(&cache_path) {
            tracing::warn!("failed to save fingerprints: {:#}", e);
        }
        drop(cache);

        report.duration = start.elapsed();
        self.emit(BuildEvent::BuildFinished {
            root: root.to_string(),
            success: report.success(),
            duration_ms: report.duration.as_millis() as u64,
            targets_built: report.executed.len() as u64,
        });

        if report.success() {
            tracing::debug!(
                "`{}` finished: {} run, {} fresh in {:.2}s",
                root,
                report.executed.len(),
                report.fresh.len(),
                report.duration.as_secs_f64()
            );
        } else {
            tracing::debug!(
                "`{}` failed: {} failed, {} skipped",
                root,
                report.failures.len(),
                report.skipped.len()
            );
        }

        Ok(report)
    }

    /// Mark everything downstream of a failed target as skipped.
    fn skip_dependents(
        &self,
        failed: usize,
        dependents: &HashMap<usize, Vec<usize>>,
        skipped: &mut BTreeMap<String, String>,
    ) {
        let targets = self.graph.targets();
        let failed_name = &targets[failed].name;
        let mut queue: VecDeque<usize> = dependents.get(&failed).cloned().unwrap_or_default().into();

        while let Some(idx) = queue.pop_front() {
            let name = &targets[idx].name;
            if skipped.contains_key(name) {
                continue;
            }
            tracing::debug!("skipping `{}` due to failed dependency `{}`", name, failed_name);
            skipped.insert(name.clone(), failed_name.clone());
            self.emit(BuildEvent::TargetSkipped {
                target: name.clone(),
                failed_dependency: failed_name.clone(),
            });
            queue.extend(dependents.get(&idx).into_iter().flatten());
        }
    }

    /// Run one target and settle its record.
    fn build_one(&self, target: &Target, record: &BuildRecord) -> Outcome {
        self.emit(BuildEvent::TargetStarted {
            target: target.name.clone(),
            tool: target.tool().kind().to_string(),
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_target(target)))
            .unwrap_or_else(|_| {
                Err(BuildError::Script {
                    target: target.name.clone(),
                    message: "command builder panicked".to_string(),
                })
            });

        match result {
            Ok(outcome) => {
                if let Some(artifact) = outcome.artifact() {
                    record.succeed(artifact.clone());
                    self.emit(BuildEvent::TargetFinished {
                        target: target.name.clone(),
                        artifacts: artifact.paths().to_vec(),
                        fresh: matches!(outcome, Outcome::Fresh(_)),
                    });
                }
                outcome
            }
            Err(error) => {
                tracing::debug!("`{}` failed: {}", target.name, error);
                let error = Arc::new(error);
                record.fail(Arc::clone(&error));
                self.emit(BuildEvent::TargetFailed {
                    target: target.name.clone(),
                    command: error.command().map(str::to_string),
                    message: error.to_string(),
                });
                Outcome::Failed(error)
            }
        }
    }

    fn run_target(&self, target: &Target) -> Result<Outcome, BuildError> {
        let inputs = self.get_actual_inputs(target)?;
        let options = target.effective_options(&self.ctx.defaults);
        let executor = ToolExecutor::new(self.ctx);
        let step = executor.prepare(target, &inputs, &options)?;

        let (Some(command), Some(output)) = (step.command_line(), step.output().map(PathBuf::from))
        else {
            return executor.run(&target.name, step).map(Outcome::Aggregated);
        };

        let fingerprint = TargetFingerprint::for_step(target.tool().kind().as_str(), &command, &inputs)
            .map_err(|e| BuildError::Fingerprint {
                target: target.name.clone(),
                message: format!("{:#}", e),
            })?;

        if !self.ctx.force && output.exists() && self.cache().is_fresh(&target.name, &fingerprint) {
            tracing::debug!("`{}` is up to date", target.name);
            return Ok(Outcome::Fresh(Artifact::File(output)));
        }

        tracing::debug!("building `{}`", target.name);
        match executor.run(&target.name, step) {
            Ok(artifact) => {
                self.cache().update(target.name.clone(), fingerprint);
                Ok(Outcome::Ran(artifact))
            }
            Err(e) => {
                self.cache().remove(&target.name);
                Err(e)
            }
        }
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, FingerprintCache> {
        self.fingerprints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flatten a target's inputs into concrete paths.
    ///
    /// Target inputs contribute the artifact of the referenced target, which
    /// must already have succeeded in this evaluation.
    pub fn get_actual_inputs(&self, target: &Target) -> Result<Vec<PathBuf>, BuildError> {
        let mut paths = Vec::new();

        for input in target.inputs() {
            match input {
                Input::Path {
                    path,
                    root_relative,
                } => paths.push(self.ctx.resolve_input(target.base_dir(), path, *root_relative)),
                Input::Target(dep) => {
                    let artifact = self
                        .records
                        .get(dep)
                        .and_then(|record| record.artifact())
                        .ok_or_else(|| BuildError::UnresolvedDependency {
                            target: target.name.clone(),
                            dependency: dep.clone(),
                        })?;
                    paths.extend(artifact.paths().iter().cloned());
                }
            }
        }

        Ok(paths)
    }
}
