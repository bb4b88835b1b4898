//! Existing-PR preflight before confirmation.

use std::collections::BTreeSet;
use std::sync::Arc;

use fleetpr_core::{PullRequestForge, ReleaseTrack, RepositoryRef, ScanBoard};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::selection::SelectionSet;

/// What a confirmed batch would touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightReport {
    /// Selected repositories with commits that already have an open PR.
    pub existing_prs: usize,
    /// Selected repositories with a non-empty diff.
    pub repos_with_commits: usize,
    /// Union of tickets across the selected diffs, sorted.
    pub tickets: Vec<String>,
    /// Lookups that failed and were counted as "no existing PR".
    pub lookup_failures: usize,
}

/// Look up open PRs for every selected repository with commits, at most
/// `concurrency` at a time. Diffs come from the scan board; nothing is
/// fetched again.
pub async fn check_existing_prs(
    forge: Arc<dyn PullRequestForge>,
    repos: &[RepositoryRef],
    selection: &SelectionSet,
    board: &ScanBoard,
    track: ReleaseTrack,
    concurrency: usize,
) -> PreflightReport {
    let mut report = PreflightReport::default();
    let mut tickets = BTreeSet::new();
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut lookups = JoinSet::new();

    for index in selection.indices() {
        let (Some(repo), Some(diff)) = (repos.get(index), board.get(index).and_then(|s| s.diff()))
        else {
            continue;
        };
        report.repos_with_commits += 1;
        tickets.extend(diff.tickets.iter().cloned());

        let forge = Arc::clone(&forge);
        let permits = Arc::clone(&permits);
        let repo = repo.clone();
        let pair = track.branch_pair(&repo);
        lookups.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let found = forge.find_open_pr(repo.path(), &pair.head, &pair.base).await;
            if let Err(e) = &found {
                debug!(repo = %repo.display_name, error = %e, "existing PR lookup failed");
            }
            found
        });
    }

    while let Some(joined) = lookups.join_next().await {
        match joined {
            Ok(Ok(Some(_))) => report.existing_prs += 1,
            Ok(Ok(None)) => {}
            Ok(Err(_)) | Err(_) => report.lookup_failures += 1,
        }
    }
    report.tickets = tickets.into_iter().collect();
    report
}
