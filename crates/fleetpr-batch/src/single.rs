//! Single-repository release: one repository, errors surface directly.

use fleetpr_core::{
    render_pr_body, BranchPair, DiffResult, PullRequestRef, ReleaseTrack, RepositoryRef, Result,
};
use tracing::{debug, info};

use crate::context::ReleaseContext;
use crate::outcome::{BatchOutcome, SkipReason};

/// What [`SingleRelease::submit`] will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinglePlan {
    pub repo: RepositoryRef,
    pub track: ReleaseTrack,
    pub pair: BranchPair,
    pub diff: DiffResult,
    /// Open PR for the pair, updated instead of creating a new one.
    pub existing: Option<PullRequestRef>,
    pub title: String,
    pub body: String,
}

impl SinglePlan {
    pub fn has_commits(&self) -> bool {
        !self.diff.is_empty()
    }

    pub fn is_update(&self) -> bool {
        self.existing.is_some()
    }
}

/// Fetch, diff and create-or-update for one repository.
pub struct SingleRelease {
    ctx: ReleaseContext,
}

impl SingleRelease {
    pub fn new(ctx: ReleaseContext) -> Self {
        Self { ctx }
    }

    /// Fetch both branches, diff them and look up an open PR. A failed
    /// lookup is treated as "no open PR".
    pub async fn prepare(
        &self,
        repo: &RepositoryRef,
        track: ReleaseTrack,
        title: Option<String>,
    ) -> Result<SinglePlan> {
        let pair = track.branch_pair(repo);
        let diff = self
            .ctx
            .vcs
            .fetch_and_diff(repo.path(), &pair, &self.ctx.tickets)
            .await?;

        let existing = if diff.is_empty() {
            None
        } else {
            match self
                .ctx
                .forge
                .find_open_pr(repo.path(), &pair.head, &pair.base)
                .await
            {
                Ok(existing) => existing,
                Err(e) => {
                    debug!(repo = %repo.display_name, error = %e, "open PR lookup failed");
                    None
                }
            }
        };

        Ok(SinglePlan {
            title: title.unwrap_or_else(|| track.default_title(&repo.stable_branch)),
            body: render_pr_body(&diff.tickets, &self.ctx.org),
            repo: repo.clone(),
            track,
            pair,
            diff,
            existing,
        })
    }

    /// Create or update the PR described by `plan`. A plan without commits
    /// is skipped without touching the forge.
    pub async fn submit(&self, plan: &SinglePlan) -> Result<BatchOutcome> {
        let name = plan.repo.display_name.as_str();
        if !plan.has_commits() {
            return Ok(BatchOutcome::skipped(name, SkipReason::NoCommits));
        }
        let forge = &self.ctx.forge;
        let outcome = match &plan.existing {
            Some(pr) => {
                let pr = forge
                    .update_pr(plan.repo.path(), pr.number, &plan.title, &plan.body)
                    .await?;
                BatchOutcome::updated(name, pr.url, plan.diff.tickets.clone())
            }
            None => {
                let pr = forge
                    .create_pr(
                        plan.repo.path(),
                        &plan.pair.head,
                        &plan.pair.base,
                        &plan.title,
                        &plan.body,
                    )
                    .await?;
                BatchOutcome::created(name, pr.url, plan.diff.tickets.clone())
            }
        };
        info!(repo = %name, status = outcome.status.label(), "single release submitted");
        Ok(outcome)
    }
}
