//! Batch pipeline errors.

use fleetpr_core::FleetError;

/// Refused or invalid batch operations.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("no repositories selected")]
    EmptySelection,

    #[error("none of the selected repositories has commits to merge")]
    NothingToProcess,

    /// An operation was invoked in a phase that does not allow it.
    #[error("cannot {action} while {phase}")]
    InvalidTransition { phase: String, action: &'static str },

    /// The scan stream closed before every selected repository reported.
    #[error("scan ended with {pending} selected repositories still pending")]
    ScanClosed { pending: usize },

    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    #[error(transparent)]
    Fleet(#[from] FleetError),
}

pub type BatchResult<T> = std::result::Result<T, BatchError>;
