//! Domain-level error taxonomy for fleetpr.

/// fleetpr domain errors.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// One or more branches could not be resolved on the remote.
    #[error("branch not found on remote: {}", .branches.join(", "))]
    RefNotFound { branches: Vec<String> },

    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed response from the forge or from git plumbing output.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("repository discovery failed: {0}")]
    Discovery(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FleetError {
    /// Build a [`FleetError::RefNotFound`] for the given branch names.
    pub fn ref_not_found<I, S>(branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FleetError::RefNotFound {
            branches: branches.into_iter().map(Into::into).collect(),
        }
    }

    /// `true` when the error means "branch absent on the remote" rather than
    /// a hard failure.
    pub fn is_ref_not_found(&self) -> bool {
        matches!(self, FleetError::RefNotFound { .. })
    }
}

/// Result type for fleetpr domain operations.
pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_not_found_names_every_branch() {
        let err = FleetError::ref_not_found(["staging", "dev"]);
        let msg = err.to_string();
        assert!(msg.contains("staging"));
        assert!(msg.contains("dev"));
        assert!(err.is_ref_not_found());
    }

    #[test]
    fn test_transport_error_is_not_ref_not_found() {
        let err = FleetError::Transport("connection reset".to_string());
        assert!(!err.is_ref_not_found());
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_not_authenticated_display() {
        let err = FleetError::NotAuthenticated("run `gh auth login` first".to_string());
        assert!(err.to_string().starts_with("not authenticated"));
    }
}
