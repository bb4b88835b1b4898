//! Pull-all mode: bring one branch up to date in every repository, one
//! repository at a time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use fleetpr_core::obs;
use fleetpr_core::{FleetError, RepositoryRef, VersionControl};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

/// Which branch to pull in each repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullBranch {
    /// The repository's own stable branch (`main` or `master`).
    Stable,
    Named(String),
}

impl PullBranch {
    pub fn resolve(&self, repo: &RepositoryRef) -> String {
        match self {
            PullBranch::Stable => repo.stable_branch.clone(),
            PullBranch::Named(name) => name.clone(),
        }
    }
}

impl FromStr for PullBranch {
    type Err = String;

    /// `main` (or `stable`) selects each repository's stable branch.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err("branch name must not be empty".to_string()),
            "main" | "stable" => Ok(PullBranch::Stable),
            name => Ok(PullBranch::Named(name.to_string())),
        }
    }
}

impl fmt::Display for PullBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullBranch::Stable => f.write_str("main"),
            PullBranch::Named(name) => f.write_str(name),
        }
    }
}

/// Terminal classification of one repository in a pull-all walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PullStatus {
    Updated { commits: usize },
    UpToDate,
    SkippedNoBranch,
    SkippedDirty,
    Failed { error: String },
}

impl PullStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PullStatus::Updated { .. } => "updated",
            PullStatus::UpToDate => "up_to_date",
            PullStatus::SkippedNoBranch => "skipped_no_branch",
            PullStatus::SkippedDirty => "skipped_dirty",
            PullStatus::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for PullStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullStatus::Updated { commits: 1 } => f.write_str("Updated (1 commit)"),
            PullStatus::Updated { commits } => write!(f, "Updated ({commits} commits)"),
            PullStatus::UpToDate => f.write_str("Already up to date"),
            PullStatus::SkippedNoBranch => f.write_str("Skipped: branch not found"),
            PullStatus::SkippedDirty => f.write_str("Skipped: uncommitted changes"),
            PullStatus::Failed { error } => write!(f, "Failed: {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullOutcome {
    /// Display name of the repository.
    pub repo: String,
    /// Branch actually pulled, after resolving [`PullBranch::Stable`].
    pub branch: String,
    pub status: PullStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullSummary {
    pub updated: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Commits pulled across every updated repository.
    pub commits: usize,
    pub outcomes: Vec<PullOutcome>,
}

impl PullSummary {
    pub fn from_outcomes(outcomes: Vec<PullOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in &outcomes {
            match outcome.status {
                PullStatus::Updated { commits } => {
                    summary.updated += 1;
                    summary.commits += commits;
                }
                PullStatus::UpToDate => summary.up_to_date += 1,
                PullStatus::SkippedNoBranch | PullStatus::SkippedDirty => summary.skipped += 1,
                PullStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary.outcomes = outcomes;
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Sequential pull over a fleet.
#[derive(Clone)]
pub struct FleetPull {
    vcs: Arc<dyn VersionControl>,
}

impl FleetPull {
    pub fn new(vcs: Arc<dyn VersionControl>) -> Self {
        Self { vcs }
    }

    /// Pull every repository in order. A failing repository never stops the
    /// walk.
    pub async fn pull_all(&self, repos: &[RepositoryRef], branch: &PullBranch) -> PullSummary {
        let mut outcomes = Vec::with_capacity(repos.len());
        for repo in repos {
            outcomes.push(self.pull_repo(repo, branch).await);
        }
        PullSummary::from_outcomes(outcomes)
    }

    /// Pull one repository: branch check, clean-tree check, fetch, then a
    /// fast-forward.
    pub async fn pull_repo(&self, repo: &RepositoryRef, branch: &PullBranch) -> PullOutcome {
        let target = branch.resolve(repo);
        let span = tracing::info_span!("pull.repo", repo = %repo.display_name, branch = %target);
        let status = self.classify(repo, &target).instrument(span).await;
        obs::emit_pull_outcome(&repo.display_name, &target, status.label());
        PullOutcome {
            repo: repo.display_name.clone(),
            branch: target,
            status,
        }
    }

    async fn classify(&self, repo: &RepositoryRef, branch: &str) -> PullStatus {
        let path = repo.path();
        if !self.vcs.has_branch(path, branch).await {
            return PullStatus::SkippedNoBranch;
        }
        match self.vcs.is_dirty(path).await {
            Ok(true) => return PullStatus::SkippedDirty,
            Ok(false) => {}
            Err(e) => return failed(e),
        }
        match self
            .vcs
            .fetch_remote_branches(path, &[branch.to_string()])
            .await
        {
            Ok(()) => {}
            Err(FleetError::RefNotFound { .. }) => return PullStatus::SkippedNoBranch,
            Err(e) => return failed(e),
        }
        match self.vcs.pull(path, branch).await {
            Ok(0) => PullStatus::UpToDate,
            Ok(commits) => PullStatus::Updated { commits },
            Err(e) => failed(e),
        }
    }
}

fn failed(error: FleetError) -> PullStatus {
    PullStatus::Failed {
        error: error.to_string(),
    }
}
