//! fleetpr core library
//!
//! Commit range diffing, collaborator ports and adapters, repository
//! discovery, and the concurrent multi-repository scan coordinator used by
//! the batch pipeline and the `fleetpr` binary.

pub mod adapters;
pub mod config;
pub mod differ;
pub mod discovery;
pub mod domain;
pub mod fakes;
pub mod obs;
pub mod ports;
pub mod scan;
pub mod telemetry;
pub mod tickets;

pub use adapters::{DryRunForge, DryRunVcs, GhCli, GitCli};
pub use config::FleetConfig;
pub use differ::{diff_commits, CommitGraph, CommitGraphSnapshot, CommitNode};
pub use discovery::{current_repository, discover_repositories, find_repo_root, RepoGroup};
pub use domain::{
    collect_tickets, BranchPair, CommitId, CommitRecord, DiffResult, FleetError, OpenReleasePrs,
    PullRequestRef, ReleaseTrack, RepoOpenPrs, RepositoryRef, Result, WorkflowJob, WorkflowRun,
    WorkflowStep,
};
pub use ports::{PullRequestForge, VersionControl, WorkflowRuns};
pub use scan::{ScanBoard, ScanOptions, ScanResult, ScanSession, ScanState};
pub use telemetry::init_tracing;
pub use tickets::{render_pr_body, TicketPattern};
