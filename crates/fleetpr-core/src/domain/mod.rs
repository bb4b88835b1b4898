//! Domain models for fleetpr.
//!
//! Canonical definitions for the core entities:
//! - `RepositoryRef`: one discovered repository
//! - `ReleaseTrack` / `BranchPair`: which branches a release PR promotes
//! - `CommitRecord` / `DiffResult`: head-only commits of a repository
//! - `PullRequestRef`: a pull request as reported by the forge
//! - `WorkflowRun` / `WorkflowJob`: CI runs as reported by the forge

pub mod commit;
pub mod error;
pub mod pull_request;
pub mod repo;
pub mod workflow;

// Re-export main types and errors
pub use commit::{collect_tickets, CommitId, CommitRecord, DiffResult, SHORT_HASH_LEN};
pub use error::{FleetError, Result};
pub use pull_request::{OpenReleasePrs, PullRequestRef, RepoOpenPrs};
pub use repo::{remote_ref, BranchPair, ReleaseTrack, RepositoryRef, REMOTE};
pub use workflow::{WorkflowJob, WorkflowRun, WorkflowStep};
