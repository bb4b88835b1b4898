//! CI workflow runs and jobs as reported by the forge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_COMPLETED: &str = "completed";

/// One run of a CI workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub database_id: u64,
    #[serde(default)]
    pub display_title: String,
    #[serde(default)]
    pub workflow_name: String,
    pub status: String,
    /// Empty until the run completes.
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub head_branch: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    /// Queued or in progress.
    pub fn is_active(&self) -> bool {
        self.status == STATUS_QUEUED || self.status == STATUS_IN_PROGRESS
    }

    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }

    /// Conclusion when completed, status otherwise.
    pub fn state_label(&self) -> &str {
        if self.is_completed() && !self.conclusion.is_empty() {
            &self.conclusion
        } else {
            &self.status
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub name: String,
    pub number: u32,
    pub status: String,
    #[serde(default)]
    pub conclusion: String,
}

/// One job of a workflow run, with its steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowJob {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub url: String,
}
