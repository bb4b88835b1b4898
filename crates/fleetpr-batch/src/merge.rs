//! Merge-PR mode: list open release PRs across the fleet and merge a
//! chosen subset one at a time.

use std::sync::Arc;

use fleetpr_core::obs;
use fleetpr_core::{PullRequestForge, PullRequestRef, ReleaseTrack, RepoOpenPrs, RepositoryRef};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::warn;

/// One open release PR that can be merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCandidate {
    pub repo: RepositoryRef,
    pub track: ReleaseTrack,
    pub pr: PullRequestRef,
}

impl MergeCandidate {
    /// `frontend/web: dev → staging #12`
    pub fn label(&self) -> String {
        format!(
            "{}: {} #{}",
            self.repo.display_name,
            self.track.display(&self.repo.stable_branch),
            self.pr.number
        )
    }
}

/// Result of one merge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub track: ReleaseTrack,
    pub success: bool,
    pub error: Option<String>,
}

/// Open release PRs of every repository, concurrently. Repositories whose
/// lookup fails or that have no open release PR are left out; the rest keep
/// the order of `repos`.
pub async fn list_open_release_prs(
    forge: Arc<dyn PullRequestForge>,
    repos: &[RepositoryRef],
) -> Vec<RepoOpenPrs> {
    let mut lookups = JoinSet::new();
    for (index, repo) in repos.iter().cloned().enumerate() {
        let forge = Arc::clone(&forge);
        lookups.spawn(async move {
            let prs = forge.open_release_prs(&repo).await;
            (index, repo, prs)
        });
    }

    let mut found = Vec::new();
    while let Some(joined) = lookups.join_next().await {
        match joined {
            Ok((index, repo, Ok(prs))) if !prs.is_empty() => {
                found.push((index, RepoOpenPrs { repo, prs }));
            }
            Ok((_, _, Ok(_))) => {}
            Ok((_, repo, Err(e))) => {
                warn!(repo = %repo.display_name, error = %e, "skipping repository, open PR lookup failed");
            }
            Err(e) => warn!(error = %e, "open PR lookup task failed"),
        }
    }
    found.sort_by_key(|(index, _)| *index);
    found.into_iter().map(|(_, prs)| prs).collect()
}

/// Flatten listings into candidates, one per open PR, tracks in
/// [`ReleaseTrack::ALL`] order.
pub fn merge_candidates(open: &[RepoOpenPrs]) -> Vec<MergeCandidate> {
    open.iter()
        .flat_map(|entry| {
            ReleaseTrack::ALL.into_iter().filter_map(|track| {
                entry.prs.get(track).map(|pr| MergeCandidate {
                    repo: entry.repo.clone(),
                    track,
                    pr: pr.clone(),
                })
            })
        })
        .collect()
}

/// Merge `candidates` sequentially. A failed merge is recorded and the run
/// continues with the next candidate.
pub async fn merge_selected(
    forge: &dyn PullRequestForge,
    candidates: &[MergeCandidate],
) -> Vec<MergeOutcome> {
    let mut outcomes = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let result = forge
            .merge_pr(candidate.repo.path(), candidate.pr.number)
            .await;
        obs::emit_merge_outcome(
            &candidate.repo.display_name,
            candidate.pr.number,
            result.is_ok(),
        );
        outcomes.push(MergeOutcome {
            repo: candidate.repo.display_name.clone(),
            number: candidate.pr.number,
            title: candidate.pr.title.clone(),
            url: candidate.pr.url.clone(),
            track: candidate.track,
            success: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        });
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetpr_core::fakes::{ForgeOp, MemoryForge};

    fn fleet() -> Vec<RepositoryRef> {
        vec![
            RepositoryRef::new("/fleet/web", "frontend/web", "main"),
            RepositoryRef::new("/fleet/api", "backend/api", "master"),
            RepositoryRef::new("/fleet/docs", "frontend/docs", "main"),
            RepositoryRef::new("/fleet/broken", "backend/broken", "main"),
        ]
    }

    #[tokio::test]
    async fn test_listing_skips_failures_and_empty_repos() {
        let forge = Arc::new(MemoryForge::new());
        forge.add_open_pr("/fleet/web", "dev", "staging", "dev → staging");
        forge.add_open_pr("/fleet/web", "staging", "main", "staging → main");
        forge.add_open_pr("/fleet/api", "staging", "master", "staging → master");
        forge.add_open_pr("/fleet/broken", "dev", "staging", "x");
        forge.fail_on("/fleet/broken", ForgeOp::Find);

        let open = list_open_release_prs(forge, &fleet()).await;
        let names: Vec<&str> = open.iter().map(|o| o.repo.display_name.as_str()).collect();
        assert_eq!(names, vec!["frontend/web", "backend/api"]);

        let candidates = merge_candidates(&open);
        let labels: Vec<String> = candidates.iter().map(MergeCandidate::label).collect();
        assert_eq!(
            labels,
            vec![
                "frontend/web: dev → staging #1",
                "frontend/web: staging → main #2",
                "backend/api: staging → master #3",
            ]
        );
    }

    #[tokio::test]
    async fn test_merge_failure_does_not_abort() {
        let forge = MemoryForge::new();
        forge.add_open_pr("/fleet/web", "dev", "staging", "a");
        forge.add_open_pr("/fleet/api", "dev", "staging", "b");
        forge.fail_on("/fleet/web", ForgeOp::Merge);
        let repos = fleet();
        let open = vec![
            RepoOpenPrs {
                repo: repos[0].clone(),
                prs: forge.open_release_prs(&repos[0]).await.unwrap(),
            },
            RepoOpenPrs {
                repo: repos[1].clone(),
                prs: forge.open_release_prs(&repos[1]).await.unwrap(),
            },
        ];

        let outcomes = merge_selected(&forge, &merge_candidates(&open)).await;
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].success);
        assert!(outcomes[0].error.is_some());
        assert!(outcomes[1].success);
        assert_eq!(forge.merged(), vec![(std::path::PathBuf::from("/fleet/api"), 2)]);
    }
}
