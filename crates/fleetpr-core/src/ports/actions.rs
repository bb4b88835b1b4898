//! CI workflow-run collaborator.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::error::Result;
use crate::domain::workflow::{WorkflowJob, WorkflowRun};

/// Injectable source of CI workflow runs.
#[async_trait]
pub trait WorkflowRuns: Send + Sync {
    /// The `limit` most recent runs of `repo`, newest first.
    async fn list_runs(&self, repo: &Path, limit: usize) -> Result<Vec<WorkflowRun>>;

    async fn run_jobs(&self, repo: &Path, run_id: u64) -> Result<Vec<WorkflowJob>>;
}
