//! Pull-request forge collaborator.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::error::Result;
use crate::domain::pull_request::{OpenReleasePrs, PullRequestRef};
use crate::domain::repo::{ReleaseTrack, RepositoryRef};

/// Injectable pull-request backend.
#[async_trait]
pub trait PullRequestForge: Send + Sync {
    /// Fails with [`FleetError::NotAuthenticated`](crate::FleetError::NotAuthenticated)
    /// when no usable credentials are configured.
    async fn check_auth(&self) -> Result<()>;

    /// The open PR from `head` into `base`, if any.
    async fn find_open_pr(
        &self,
        repo: &Path,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestRef>>;

    async fn create_pr(
        &self,
        repo: &Path,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRef>;

    /// Replace title and body of an existing PR and return its refreshed state.
    async fn update_pr(
        &self,
        repo: &Path,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<PullRequestRef>;

    /// Merge with a merge commit, keeping the head branch.
    async fn merge_pr(&self, repo: &Path, number: u64) -> Result<()>;

    /// Open release PRs of `repo` for every [`ReleaseTrack`].
    async fn open_release_prs(&self, repo: &RepositoryRef) -> Result<OpenReleasePrs> {
        let mut prs = OpenReleasePrs::default();
        for track in ReleaseTrack::ALL {
            let pair = track.branch_pair(repo);
            let pr = self.find_open_pr(repo.path(), &pair.head, &pair.base).await?;
            prs.set(track, pr);
        }
        Ok(prs)
    }
}
