//! Per-repository scan state.

use serde::{Deserialize, Serialize};

use crate::domain::commit::DiffResult;
use crate::scan::session::ScanResult;

/// Tri-state scan status of one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScanState {
    /// No result yet.
    #[default]
    Pending,
    /// Scanned, nothing to release. `warning` carries a surfaced scan error.
    Empty { warning: Option<String> },
    /// Scanned, with commits to release.
    Populated { diff: DiffResult },
}

impl ScanState {
    pub fn is_pending(&self) -> bool {
        matches!(self, ScanState::Pending)
    }

    pub fn diff(&self) -> Option<&DiffResult> {
        match self {
            ScanState::Populated { diff } => Some(diff),
            _ => None,
        }
    }

    pub fn commit_count(&self) -> usize {
        self.diff().map_or(0, DiffResult::len)
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            ScanState::Empty { warning } => warning.as_deref(),
            _ => None,
        }
    }
}

impl From<&ScanResult> for ScanState {
    fn from(result: &ScanResult) -> Self {
        if let Some(error) = &result.error {
            return ScanState::Empty {
                warning: Some(error.clone()),
            };
        }
        if result.diff.is_empty() {
            ScanState::Empty { warning: None }
        } else {
            ScanState::Populated {
                diff: result.diff.clone(),
            }
        }
    }
}

/// Scan states of every repository in a session, indexed like the
/// repository list. Owned by the consuming control loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanBoard {
    states: Vec<ScanState>,
}

impl ScanBoard {
    pub fn new(len: usize) -> Self {
        Self {
            states: vec![ScanState::Pending; len],
        }
    }

    /// Record a worker's result. The first result for a repository wins;
    /// late or out-of-range results are ignored. Returns whether the board
    /// changed.
    pub fn apply(&mut self, result: &ScanResult) -> bool {
        match self.states.get_mut(result.index) {
            Some(slot) if slot.is_pending() => {
                *slot = ScanState::from(result);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<&ScanState> {
        self.states.get(index)
    }

    pub fn states(&self) -> &[ScanState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.states.iter().filter(|s| s.is_pending()).count()
    }

    /// `true` once none of `indices` is pending.
    pub fn all_settled(&self, indices: impl IntoIterator<Item = usize>) -> bool {
        indices
            .into_iter()
            .all(|i| self.states.get(i).is_some_and(|s| !s.is_pending()))
    }
}
