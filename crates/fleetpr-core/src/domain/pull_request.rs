//! Pull request references returned by the forge.

use serde::{Deserialize, Serialize};

use crate::domain::repo::{ReleaseTrack, RepositoryRef};

/// An open (or just created/updated) pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub state: String,
}

impl PullRequestRef {
    pub fn new(number: u64, url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            number,
            url: url.into(),
            title: title.into(),
            state: "open".to_string(),
        }
    }
}

/// Open release PRs of one repository, one slot per track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenReleasePrs {
    pub dev_to_staging: Option<PullRequestRef>,
    pub staging_to_stable: Option<PullRequestRef>,
}

impl OpenReleasePrs {
    pub fn get(&self, track: ReleaseTrack) -> Option<&PullRequestRef> {
        match track {
            ReleaseTrack::DevToStaging => self.dev_to_staging.as_ref(),
            ReleaseTrack::StagingToStable => self.staging_to_stable.as_ref(),
        }
    }

    pub fn set(&mut self, track: ReleaseTrack, pr: Option<PullRequestRef>) {
        match track {
            ReleaseTrack::DevToStaging => self.dev_to_staging = pr,
            ReleaseTrack::StagingToStable => self.staging_to_stable = pr,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dev_to_staging.is_none() && self.staging_to_stable.is_none()
    }
}

/// A repository paired with its open release PRs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOpenPrs {
    pub repo: RepositoryRef,
    pub prs: OpenReleasePrs,
}
