//! Progress reporting for batch runs.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use fleetpr_core::RepositoryRef;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::outcome::BatchOutcome;
use crate::pipeline::BatchPhase;

/// Step about to be performed for the current repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStep {
    FetchingBranches,
    GettingCommits,
    CheckingExistingPr,
    CreatingPr,
    UpdatingPr,
}

impl BatchStep {
    pub fn label(&self) -> &'static str {
        match self {
            BatchStep::FetchingBranches => "Fetching branches...",
            BatchStep::GettingCommits => "Getting commits...",
            BatchStep::CheckingExistingPr => "Checking for existing PR...",
            BatchStep::CreatingPr => "Creating PR...",
            BatchStep::UpdatingPr => "Updating PR...",
        }
    }
}

impl fmt::Display for BatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Receives batch progress. Called from the pipeline's control loop, before
/// each blocking step and after each recorded outcome.
pub trait BatchObserver: Send + Sync {
    fn on_step(&self, repo: &RepositoryRef, step: BatchStep);

    fn on_outcome(&self, outcome: &BatchOutcome);

    fn on_phase(&self, _phase: &BatchPhase) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {
    fn on_step(&self, _repo: &RepositoryRef, _step: BatchStep) {}

    fn on_outcome(&self, _outcome: &BatchOutcome) {}
}

/// Latest progress state, as published by [`WatchObserver`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub repo: Option<String>,
    pub step: Option<BatchStep>,
    /// Outcomes recorded so far.
    pub completed: usize,
}

/// Publishes the current `(repository, step)` pair on a watch channel for
/// renderers that only care about the latest state.
#[derive(Debug)]
pub struct WatchObserver {
    tx: watch::Sender<ProgressSnapshot>,
}

impl WatchObserver {
    pub fn new() -> (Self, watch::Receiver<ProgressSnapshot>) {
        let (tx, rx) = watch::channel(ProgressSnapshot::default());
        (Self { tx }, rx)
    }
}

impl BatchObserver for WatchObserver {
    fn on_step(&self, repo: &RepositoryRef, step: BatchStep) {
        self.tx.send_modify(|s| {
            s.repo = Some(repo.display_name.clone());
            s.step = Some(step);
        });
    }

    fn on_outcome(&self, _outcome: &BatchOutcome) {
        self.tx.send_modify(|s| {
            s.completed += 1;
            s.step = None;
        });
    }
}

/// Event captured by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Step { repo: String, step: BatchStep },
    Outcome(BatchOutcome),
    Phase(BatchPhase),
}

/// Keeps every event in order; used by tests and transcripts.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Step labels recorded for `repo`, in order.
    pub fn steps_for(&self, repo: &str) -> Vec<BatchStep> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::Step { repo: r, step } if r == repo => Some(step),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ObservedEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl BatchObserver for RecordingObserver {
    fn on_step(&self, repo: &RepositoryRef, step: BatchStep) {
        self.push(ObservedEvent::Step {
            repo: repo.display_name.clone(),
            step,
        });
    }

    fn on_outcome(&self, outcome: &BatchOutcome) {
        self.push(ObservedEvent::Outcome(outcome.clone()));
    }

    fn on_phase(&self, phase: &BatchPhase) {
        self.push(ObservedEvent::Phase(phase.clone()));
    }
}
