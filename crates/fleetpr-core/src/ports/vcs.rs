//! Version-control collaborator.

use std::path::Path;

use async_trait::async_trait;

use crate::differ::{diff_commits, CommitGraphSnapshot};
use crate::domain::commit::DiffResult;
use crate::domain::error::Result;
use crate::domain::repo::BranchPair;
use crate::tickets::TicketPattern;

/// Branch used when neither `main` nor `master` can be found.
pub const DEFAULT_STABLE_BRANCH: &str = "main";

/// Injectable version-control backend.
///
/// Implementations must be cheap to share across scan workers.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Fetch `branches` from the remote into their remote-tracking refs.
    ///
    /// Branches absent on the remote yield
    /// [`FleetError::RefNotFound`](crate::FleetError::RefNotFound).
    async fn fetch_remote_branches(&self, repo: &Path, branches: &[String]) -> Result<()>;

    async fn has_remote_branch(&self, repo: &Path, branch: &str) -> Result<bool>;

    async fn has_local_branch(&self, repo: &Path, branch: &str) -> Result<bool>;

    /// `true` when the working tree has uncommitted changes.
    async fn is_dirty(&self, repo: &Path) -> Result<bool>;

    /// Check out `branch` and fast-forward it to its remote-tracking ref.
    /// Returns the number of commits the branch moved forward.
    async fn pull(&self, repo: &Path, branch: &str) -> Result<usize>;

    /// Load the ancestry of both refs of `pair` plus whichever of the two
    /// refs resolve. Unresolvable refs are left out of the snapshot.
    async fn load_graph(&self, repo: &Path, pair: &BranchPair) -> Result<CommitGraphSnapshot>;

    /// `true` when `name` exists locally or as a remote-tracking branch.
    async fn has_branch(&self, repo: &Path, name: &str) -> bool {
        matches!(self.has_remote_branch(repo, name).await, Ok(true))
            || matches!(self.has_local_branch(repo, name).await, Ok(true))
    }

    /// Detect the stable branch: remote `main`, remote `master`, local `main`,
    /// local `master`, falling back to [`DEFAULT_STABLE_BRANCH`].
    async fn detect_stable_branch(&self, repo: &Path) -> String {
        for name in ["main", "master"] {
            if matches!(self.has_remote_branch(repo, name).await, Ok(true)) {
                return name.to_string();
            }
        }
        for name in ["main", "master"] {
            if matches!(self.has_local_branch(repo, name).await, Ok(true)) {
                return name.to_string();
            }
        }
        DEFAULT_STABLE_BRANCH.to_string()
    }

    /// Commits on `pair.head` not yet on `pair.base`, from already-fetched
    /// remote-tracking refs.
    async fn diff(
        &self,
        repo: &Path,
        pair: &BranchPair,
        tickets: &TicketPattern,
    ) -> Result<DiffResult> {
        let graph = self.load_graph(repo, pair).await?;
        diff_commits(&graph, pair, tickets)
    }

    /// Fetch both branches, then diff them.
    async fn fetch_and_diff(
        &self,
        repo: &Path,
        pair: &BranchPair,
        tickets: &TicketPattern,
    ) -> Result<DiffResult> {
        self.fetch_remote_branches(repo, &pair.branches()).await?;
        self.diff(repo, pair, tickets).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{CommitGraphBuilder, MemoryVcs};

    fn vcs() -> MemoryVcs {
        let vcs = MemoryVcs::new();
        vcs.set_graph(
            "/r",
            CommitGraphBuilder::new()
                .commit("a", "a", &[])
                .remote_branch("dev", "a")
                .build(),
        );
        vcs.add_local_branch("/r", "feature");
        vcs
    }

    #[tokio::test]
    async fn test_has_branch_checks_remote_then_local() {
        let vcs = vcs();
        let repo = Path::new("/r");
        assert!(vcs.has_branch(repo, "dev").await, "remote-only");
        assert!(vcs.has_branch(repo, "feature").await, "local-only");
        assert!(!vcs.has_branch(repo, "staging").await);
        assert!(!vcs.has_branch(Path::new("/elsewhere"), "feature").await);
    }

    #[tokio::test]
    async fn test_detect_stable_branch_falls_back_to_local_then_default() {
        let vcs = vcs();
        assert_eq!(vcs.detect_stable_branch(Path::new("/r")).await, "main");
        vcs.add_local_branch("/r", "master");
        assert_eq!(vcs.detect_stable_branch(Path::new("/r")).await, "master");
    }
}
