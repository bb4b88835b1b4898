//! Recent CI workflow runs across the fleet.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use fleetpr_core::{RepositoryRef, WorkflowRun, WorkflowRuns};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::warn;

/// Runs requested per repository.
pub const RUNS_PER_REPO: usize = 10;

/// Runs last updated longer ago than this are hidden.
pub const RECENT_WINDOW_HOURS: i64 = 48;

/// A workflow run and the repository it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionsEntry {
    pub repo: RepositoryRef,
    pub run: WorkflowRun,
}

/// Keep the runs worth showing for one repository: every queued or running
/// run, plus the newest completed run of each workflow. Runs must be newest
/// first.
pub fn recent_runs(runs: Vec<WorkflowRun>, now: DateTime<Utc>) -> Vec<WorkflowRun> {
    let cutoff = now - Duration::hours(RECENT_WINDOW_HOURS);
    let mut completed = HashSet::new();
    runs.into_iter()
        .filter(|run| run.updated_at >= cutoff)
        .filter(|run| {
            run.is_active()
                || (run.is_completed() && completed.insert(run.workflow_name.clone()))
        })
        .collect()
}

/// List recent runs of every repository concurrently, newest first.
/// Repositories whose listing fails contribute nothing.
pub async fn list_recent_runs(
    runs: Arc<dyn WorkflowRuns>,
    repos: &[RepositoryRef],
    now: DateTime<Utc>,
) -> Vec<ActionsEntry> {
    let mut listings = JoinSet::new();
    for repo in repos.iter().cloned() {
        let runs = Arc::clone(&runs);
        listings.spawn(async move {
            let listed = runs.list_runs(repo.path(), RUNS_PER_REPO).await;
            (repo, listed)
        });
    }

    let mut entries = Vec::new();
    while let Some(joined) = listings.join_next().await {
        match joined {
            Ok((repo, Ok(listed))) => {
                entries.extend(recent_runs(listed, now).into_iter().map(|run| ActionsEntry {
                    repo: repo.clone(),
                    run,
                }));
            }
            Ok((repo, Err(e))) => {
                warn!(repo = %repo.display_name, error = %e, "skipping repository, run listing failed");
            }
            Err(e) => warn!(error = %e, "run listing task failed"),
        }
    }
    entries.sort_by(|a, b| b.run.updated_at.cmp(&a.run.updated_at));
    entries
}
