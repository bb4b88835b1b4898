//! Per-repository batch outcomes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a repository was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Bookkeeping only; never shown in a summary.
    NotSelected,
    NoCommits,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotSelected => "Not selected",
            SkipReason::NoCommits => "No commits to merge",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal classification of one repository in a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Created,
    Updated,
    Skipped { reason: SkipReason },
    Failed { error: String },
}

impl OutcomeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Created | OutcomeStatus::Updated)
    }

    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Created => "created",
            OutcomeStatus::Updated => "updated",
            OutcomeStatus::Skipped { .. } => "skipped",
            OutcomeStatus::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Created => f.write_str("Created"),
            OutcomeStatus::Updated => f.write_str("Updated"),
            OutcomeStatus::Skipped { reason } => write!(f, "Skipped: {reason}"),
            OutcomeStatus::Failed { error } => write!(f, "Failed: {error}"),
        }
    }
}

/// Outcome record. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Display name of the repository.
    pub repo: String,
    pub status: OutcomeStatus,
    pub pr_url: Option<String>,
    /// Tickets linked in the PR body.
    pub tickets: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl BatchOutcome {
    fn new(repo: &str, status: OutcomeStatus) -> Self {
        Self {
            repo: repo.to_string(),
            status,
            pr_url: None,
            tickets: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    pub fn created(repo: &str, url: String, tickets: Vec<String>) -> Self {
        Self {
            pr_url: Some(url),
            tickets,
            ..Self::new(repo, OutcomeStatus::Created)
        }
    }

    pub fn updated(repo: &str, url: String, tickets: Vec<String>) -> Self {
        Self {
            pr_url: Some(url),
            tickets,
            ..Self::new(repo, OutcomeStatus::Updated)
        }
    }

    pub fn skipped(repo: &str, reason: SkipReason) -> Self {
        Self::new(repo, OutcomeStatus::Skipped { reason })
    }

    pub fn failed(repo: &str, error: impl fmt::Display) -> Self {
        Self::new(
            repo,
            OutcomeStatus::Failed {
                error: error.to_string(),
            },
        )
    }

    /// `false` only for the bookkeeping "not selected" skip.
    pub fn is_reportable(&self) -> bool {
        self.status
            != (OutcomeStatus::Skipped {
                reason: SkipReason::NotSelected,
            })
    }
}
