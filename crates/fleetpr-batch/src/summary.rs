//! End-of-run batch summary.

use serde::{Deserialize, Serialize};

use crate::outcome::{BatchOutcome, OutcomeStatus};

/// Counts over the reportable outcomes of a finished batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration_ms: u64,
    /// Reportable outcomes in processing order.
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchSummary {
    /// Summarize `outcomes`, leaving out "not selected" bookkeeping.
    pub fn from_outcomes(outcomes: &[BatchOutcome], duration_ms: u64) -> Self {
        let mut summary = Self {
            duration_ms,
            ..Self::default()
        };
        for outcome in outcomes.iter().filter(|o| o.is_reportable()) {
            match outcome.status {
                OutcomeStatus::Created => summary.created += 1,
                OutcomeStatus::Updated => summary.updated += 1,
                OutcomeStatus::Skipped { .. } => summary.skipped += 1,
                OutcomeStatus::Failed { .. } => summary.failed += 1,
            }
            summary.outcomes.push(outcome.clone());
        }
        summary
    }

    pub fn succeeded(&self) -> usize {
        self.created + self.updated
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::SkipReason;

    #[test]
    fn test_summary_hides_not_selected() {
        let outcomes = vec![
            BatchOutcome::updated("a", "https://x/1".into(), vec![]),
            BatchOutcome::skipped("b", SkipReason::NotSelected),
            BatchOutcome::created("c", "https://x/2".into(), vec!["ATT-1".into()]),
            BatchOutcome::skipped("d", SkipReason::NoCommits),
            BatchOutcome::failed("e", "git fetch: boom"),
        ];
        let summary = BatchSummary::from_outcomes(&outcomes, 10);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.has_failures());
        let repos: Vec<&str> = summary.outcomes.iter().map(|o| o.repo.as_str()).collect();
        assert_eq!(repos, vec!["a", "c", "d", "e"]);
    }
}
