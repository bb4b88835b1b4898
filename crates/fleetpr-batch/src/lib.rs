//! fleetpr batch - release PRs across a fleet of repositories
//!
//! Provides:
//! - The batch pipeline state machine (select, wait for scans, preflight,
//!   confirm, process sequentially, summarize)
//! - Progress observers for step labels and outcomes
//! - Single-repository and merge-PR modes
//! - Pull-all mode and the recent CI workflow-run listing

pub mod actions;
pub mod context;
pub mod error;
pub mod merge;
pub mod outcome;
pub mod pipeline;
pub mod preflight;
pub mod progress;
pub mod pull;
pub mod selection;
pub mod single;
pub mod summary;

// Re-export key types
pub use actions::{list_recent_runs, recent_runs, ActionsEntry};
pub use context::ReleaseContext;
pub use error::{BatchError, BatchResult};
pub use merge::{list_open_release_prs, merge_candidates, merge_selected, MergeCandidate, MergeOutcome};
pub use outcome::{BatchOutcome, OutcomeStatus, SkipReason};
pub use pipeline::{BatchPhase, BatchPipeline, BatchRun};
pub use preflight::PreflightReport;
pub use progress::{
    BatchObserver, BatchStep, NoopObserver, ObservedEvent, ProgressSnapshot, RecordingObserver,
    WatchObserver,
};
pub use pull::{FleetPull, PullBranch, PullOutcome, PullStatus, PullSummary};
pub use selection::SelectionSet;
pub use single::{SinglePlan, SingleRelease};
pub use summary::BatchSummary;
