//! Deterministic, network-free collaborators for `--dry-run`.
//!
//! Every repository gets a fingerprint derived from its directory name.
//! The fingerprint picks a simulated latency and whether the repository has
//! anything to release (roughly one in three does not), so every scan state
//! and batch outcome is reachable without touching a remote.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as TimeDelta, Utc};

use crate::differ::{CommitGraphSnapshot, CommitNode};
use crate::domain::commit::CommitId;
use crate::domain::error::Result;
use crate::domain::pull_request::PullRequestRef;
use crate::domain::repo::{BranchPair, RepositoryRef};
use crate::domain::workflow::{WorkflowJob, WorkflowRun, WorkflowStep};
use crate::ports::{PullRequestForge, VersionControl, WorkflowRuns};

const BASE_TIP: &str = "0000000000000000000000000000000000000000";

const FAKE_COMMITS: [(&str, &str); 2] = [
    (
        "abc1234000000000000000000000000000000000",
        "feat: Add new feature ATT-1234",
    ),
    (
        "def5678000000000000000000000000000000000",
        "fix: Bug fix ATT-1235",
    ),
];

/// FNV-1a over the repository directory name.
fn fingerprint(repo: &Path) -> u64 {
    let name = repo_name(repo);
    name.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn repo_name(repo: &Path) -> String {
    repo.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| repo.display().to_string())
}

/// Simulated scan latency for `repo`: 100ms plus 50ms steps.
pub fn simulated_latency(repo: &Path) -> Duration {
    Duration::from_millis(100 + (fingerprint(repo) % 8) * 50)
}

/// Whether the simulated repository has commits to release.
pub fn has_pending_work(repo: &Path) -> bool {
    fingerprint(repo) % 3 != 0
}

/// Fixed fleet used when a dry run finds no repositories on disk.
pub fn sample_repositories() -> Vec<RepositoryRef> {
    let root = PathBuf::from("/dry-run");
    [
        ("frontend/web", None),
        ("frontend/admin", None),
        ("frontend/landing", None),
        ("backend/api", None),
        ("backend/worker", None),
        ("backend/services/billing", Some("services")),
        ("backend/services/notifications", Some("services")),
    ]
    .into_iter()
    .map(|(name, parent)| {
        let repo = RepositoryRef::new(root.join(name), name, "main");
        match parent {
            Some(parent) => repo.with_parent(parent),
            None => repo,
        }
    })
    .collect()
}

/// [`VersionControl`] returning synthetic histories.
#[derive(Debug, Clone, Default)]
pub struct DryRunVcs;

#[async_trait]
impl VersionControl for DryRunVcs {
    async fn fetch_remote_branches(&self, repo: &Path, _branches: &[String]) -> Result<()> {
        tokio::time::sleep(simulated_latency(repo)).await;
        Ok(())
    }

    async fn has_remote_branch(&self, _repo: &Path, branch: &str) -> Result<bool> {
        Ok(branch != "master")
    }

    async fn has_local_branch(&self, _repo: &Path, _branch: &str) -> Result<bool> {
        Ok(true)
    }

    async fn is_dirty(&self, _repo: &Path) -> Result<bool> {
        Ok(false)
    }

    /// Every other repository is already up to date; the rest receive one to
    /// five commits.
    async fn pull(&self, repo: &Path, _branch: &str) -> Result<usize> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let fp = fingerprint(repo);
        Ok(if fp % 2 == 0 { 0 } else { (fp % 5) as usize + 1 })
    }

    async fn load_graph(&self, repo: &Path, pair: &BranchPair) -> Result<CommitGraphSnapshot> {
        let mut graph = CommitGraphSnapshot::new();
        let base = CommitId::new(BASE_TIP);
        graph.insert_commit(CommitNode::new(BASE_TIP, "chore: release", vec![]));
        graph.set_ref(pair.base_ref(), base.clone());

        let mut head = base;
        if has_pending_work(repo) {
            for (id, message) in FAKE_COMMITS.iter().rev() {
                graph.insert_commit(CommitNode::new(*id, *message, vec![head]));
                head = CommitId::new(*id);
            }
        }
        graph.set_ref(pair.head_ref(), head);
        Ok(graph)
    }
}

/// [`PullRequestForge`] that never leaves the process.
#[derive(Debug, Clone, Default)]
pub struct DryRunForge;

impl DryRunForge {
    fn url(repo: &Path, number: u64) -> String {
        format!(
            "https://github.com/example/{}/pull/{number} (DRY RUN)",
            repo_name(repo)
        )
    }
}

#[async_trait]
impl PullRequestForge for DryRunForge {
    async fn check_auth(&self) -> Result<()> {
        Ok(())
    }

    async fn find_open_pr(
        &self,
        repo: &Path,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestRef>> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if fingerprint(repo) % 4 != 1 {
            return Ok(None);
        }
        let number = 100 + fingerprint(repo) % 100;
        Ok(Some(PullRequestRef::new(
            number,
            Self::url(repo, number),
            format!("{head} → {base}"),
        )))
    }

    async fn create_pr(
        &self,
        repo: &Path,
        _head: &str,
        _base: &str,
        title: &str,
        _body: &str,
    ) -> Result<PullRequestRef> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(PullRequestRef::new(123, Self::url(repo, 123), title))
    }

    async fn update_pr(
        &self,
        repo: &Path,
        number: u64,
        title: &str,
        _body: &str,
    ) -> Result<PullRequestRef> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(PullRequestRef::new(number, Self::url(repo, number), title))
    }

    async fn merge_pr(&self, _repo: &Path, _number: u64) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(())
    }
}

fn dry_run(
    repo: &Path,
    id: u64,
    title: &str,
    workflow: &str,
    (status, conclusion): (&str, &str),
    branch: &str,
    minutes_ago: i64,
) -> WorkflowRun {
    let updated_at = Utc::now() - TimeDelta::minutes(minutes_ago);
    WorkflowRun {
        database_id: id,
        display_title: title.to_string(),
        workflow_name: workflow.to_string(),
        status: status.to_string(),
        conclusion: conclusion.to_string(),
        head_branch: branch.to_string(),
        event: "push".to_string(),
        url: format!(
            "https://github.com/example/{}/actions/runs/{id}",
            repo_name(repo)
        ),
        created_at: updated_at - TimeDelta::minutes(2),
        updated_at,
    }
}

fn dry_step(number: u32, name: &str, status: &str, conclusion: &str) -> WorkflowStep {
    WorkflowStep {
        name: name.to_string(),
        number,
        status: status.to_string(),
        conclusion: conclusion.to_string(),
    }
}

#[async_trait]
impl WorkflowRuns for DryRunForge {
    /// A CI run on `dev` whose state depends on the repository, an older
    /// superseded CI run, and a deploy on `staging`.
    async fn list_runs(&self, repo: &Path, limit: usize) -> Result<Vec<WorkflowRun>> {
        tokio::time::sleep(simulated_latency(repo)).await;
        let fp = fingerprint(repo);
        let base = 1000 * (fp % 9 + 1);
        let latest = match fp % 3 {
            0 => ("in_progress", ""),
            1 => ("completed", "success"),
            _ => ("completed", "failure"),
        };
        let done = ("completed", "success");
        let mut runs = vec![
            dry_run(repo, base + 2, "feat: Add dashboard", "CI", latest, "dev", 1 + (fp % 10) as i64),
            dry_run(repo, base + 1, "Deploy staging", "Deploy", done, "staging", 25),
            dry_run(repo, base, "fix: Auth bug", "CI", done, "dev", 40),
        ];
        runs.truncate(limit);
        Ok(runs)
    }

    async fn run_jobs(&self, repo: &Path, run_id: u64) -> Result<Vec<WorkflowJob>> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let now = Utc::now();
        let url = |job: u32| {
            format!(
                "https://github.com/example/{}/actions/runs/{run_id}/job/{job}",
                repo_name(repo)
            )
        };
        Ok(vec![
            WorkflowJob {
                name: "build".to_string(),
                status: "completed".to_string(),
                conclusion: "success".to_string(),
                started_at: Some(now - TimeDelta::minutes(5)),
                completed_at: Some(now - TimeDelta::minutes(3)),
                steps: vec![
                    dry_step(1, "Checkout", "completed", "success"),
                    dry_step(2, "Install deps", "completed", "success"),
                    dry_step(3, "Build", "completed", "success"),
                ],
                url: url(1),
            },
            WorkflowJob {
                name: "test".to_string(),
                status: "in_progress".to_string(),
                conclusion: String::new(),
                started_at: Some(now - TimeDelta::minutes(2)),
                completed_at: None,
                steps: vec![
                    dry_step(1, "Checkout", "completed", "success"),
                    dry_step(2, "Run tests", "in_progress", ""),
                    dry_step(3, "Upload coverage", "queued", ""),
                ],
                url: url(2),
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tickets::TicketPattern;

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_diff_matches_pending_work() {
        let vcs = DryRunVcs;
        let tickets = TicketPattern::compile("ATT-[0-9]+").unwrap();
        let mut saw_empty = false;
        let mut saw_populated = false;
        for repo in sample_repositories() {
            let pair = BranchPair::new("staging", "dev");
            let diff = vcs.fetch_and_diff(repo.path(), &pair, &tickets).await.unwrap();
            if has_pending_work(repo.path()) {
                assert_eq!(diff.len(), 2);
                assert_eq!(diff.tickets, vec!["ATT-1234", "ATT-1235"]);
                saw_populated = true;
            } else {
                assert!(diff.is_empty());
                saw_empty = true;
            }
        }
        assert!(saw_populated);
        assert!(saw_empty, "sample fleet should exercise the empty path");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_forge_urls_are_marked() {
        let forge = DryRunForge;
        let pr = forge
            .create_pr(Path::new("/dry-run/frontend/web"), "dev", "staging", "t", "")
            .await
            .unwrap();
        assert_eq!(pr.url, "https://github.com/example/web/pull/123 (DRY RUN)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_pull_is_clean_and_bounded() {
        for repo in sample_repositories() {
            assert!(!DryRunVcs.is_dirty(repo.path()).await.unwrap());
            let commits = DryRunVcs.pull(repo.path(), "main").await.unwrap();
            assert!(commits <= 5);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dry_run_runs_respect_limit() {
        let repo = Path::new("/dry-run/backend/api");
        let runs = DryRunForge.list_runs(repo, 2).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].updated_at > runs[1].updated_at);
        let jobs = DryRunForge.run_jobs(repo, runs[0].database_id).await.unwrap();
        assert!(jobs.iter().any(|j| j.completed_at.is_none()));
    }

    #[tokio::test]
    async fn test_dry_run_stable_branch_is_main() {
        assert_eq!(DryRunVcs.detect_stable_branch(Path::new("/x")).await, "main");
    }
}
