//! Repository identity and release tracks.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Remote every fetch and remote-tracking ref is resolved against.
pub const REMOTE: &str = "origin";

/// Fully qualified remote-tracking ref for `branch`.
pub fn remote_ref(branch: &str) -> String {
    format!("refs/remotes/{REMOTE}/{branch}")
}

/// One discovered repository. Immutable after discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Working-tree path of the repository.
    pub path: PathBuf,

    /// Display name, e.g. `"frontend/web-app"`.
    pub display_name: String,

    /// Stable branch name (`"main"` or `"master"`), detected once.
    pub stable_branch: String,

    /// Name of the enclosing repository for nested repositories.
    pub parent: Option<String>,
}

impl RepositoryRef {
    pub fn new(
        path: impl Into<PathBuf>,
        display_name: impl Into<String>,
        stable_branch: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            display_name: display_name.into(),
            stable_branch: stable_branch.into(),
            parent: None,
        }
    }

    /// Mark this repository as nested inside `parent`.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leading segment of the display name (`"frontend"` for `"frontend/web"`).
    pub fn category(&self) -> &str {
        self.display_name
            .split('/')
            .next()
            .unwrap_or(self.display_name.as_str())
    }

    /// Last path segment of the display name.
    pub fn short_name(&self) -> &str {
        self.display_name
            .rsplit('/')
            .next()
            .unwrap_or(self.display_name.as_str())
    }
}

/// A concrete `(base, head)` branch pair for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchPair {
    /// Branch the work would be merged into.
    pub base: String,
    /// Branch carrying the candidate new work.
    pub head: String,
}

impl BranchPair {
    pub fn new(base: impl Into<String>, head: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            head: head.into(),
        }
    }

    /// Both branch names, head first, in the order they are fetched.
    pub fn branches(&self) -> Vec<String> {
        vec![self.head.clone(), self.base.clone()]
    }

    pub fn base_ref(&self) -> String {
        remote_ref(&self.base)
    }

    pub fn head_ref(&self) -> String {
        remote_ref(&self.head)
    }
}

impl fmt::Display for BranchPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.head, self.base)
    }
}

/// Release track, i.e. which branch pair a release PR promotes.
///
/// The base of [`ReleaseTrack::StagingToStable`] depends on the repository's
/// stable branch, so the pair is computed per repository rather than copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseTrack {
    /// `dev` → `staging`
    DevToStaging,
    /// `staging` → `main`/`master`
    StagingToStable,
}

impl ReleaseTrack {
    pub const ALL: [ReleaseTrack; 2] = [ReleaseTrack::DevToStaging, ReleaseTrack::StagingToStable];

    pub fn head_branch(&self) -> &'static str {
        match self {
            ReleaseTrack::DevToStaging => "dev",
            ReleaseTrack::StagingToStable => "staging",
        }
    }

    pub fn base_branch<'a>(&self, stable_branch: &'a str) -> &'a str {
        match self {
            ReleaseTrack::DevToStaging => "staging",
            ReleaseTrack::StagingToStable => stable_branch,
        }
    }

    /// Branch pair for a specific repository.
    pub fn branch_pair(&self, repo: &RepositoryRef) -> BranchPair {
        BranchPair::new(self.base_branch(&repo.stable_branch), self.head_branch())
    }

    pub fn display(&self, stable_branch: &str) -> String {
        format!(
            "{} → {}",
            self.head_branch(),
            self.base_branch(stable_branch)
        )
    }

    pub fn default_title(&self, stable_branch: &str) -> String {
        self.display(stable_branch)
    }

    /// Short machine name used on the command line.
    pub fn slug(&self) -> &'static str {
        match self {
            ReleaseTrack::DevToStaging => "dev-staging",
            ReleaseTrack::StagingToStable => "staging-stable",
        }
    }
}

impl std::str::FromStr for ReleaseTrack {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dev-staging" | "dev" => Ok(ReleaseTrack::DevToStaging),
            "staging-stable" | "staging-main" | "staging" => Ok(ReleaseTrack::StagingToStable),
            other => Err(format!(
                "unknown release track '{other}' (expected dev-staging or staging-stable)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(stable: &str) -> RepositoryRef {
        RepositoryRef::new("/tmp/web", "frontend/web", stable)
    }

    #[test]
    fn test_branch_pair_uses_repository_stable_branch() {
        let pair = ReleaseTrack::StagingToStable.branch_pair(&repo("master"));
        assert_eq!(pair.base, "master");
        assert_eq!(pair.head, "staging");
        assert_eq!(pair.base_ref(), "refs/remotes/origin/master");

        let pair = ReleaseTrack::DevToStaging.branch_pair(&repo("master"));
        assert_eq!(pair.base, "staging");
        assert_eq!(pair.head, "dev");
    }

    #[test]
    fn test_track_display_and_title() {
        assert_eq!(ReleaseTrack::DevToStaging.display("main"), "dev → staging");
        assert_eq!(
            ReleaseTrack::StagingToStable.default_title("master"),
            "staging → master"
        );
    }

    #[test]
    fn test_track_parse() {
        assert_eq!(
            "dev-staging".parse::<ReleaseTrack>().unwrap(),
            ReleaseTrack::DevToStaging
        );
        assert_eq!(
            "staging-stable".parse::<ReleaseTrack>().unwrap(),
            ReleaseTrack::StagingToStable
        );
        assert!("prod".parse::<ReleaseTrack>().is_err());
    }

    #[test]
    fn test_repository_name_parts() {
        let nested = RepositoryRef::new("/x", "backend/services/billing", "main")
            .with_parent("services");
        assert_eq!(nested.category(), "backend");
        assert_eq!(nested.short_name(), "billing");
        assert_eq!(nested.parent.as_deref(), Some("services"));
    }
}
