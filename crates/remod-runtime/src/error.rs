//! Orchestrator errors.

use remod_types::{ErrorCode, ValidationError};
use thiserror::Error;

/// Errors surfaced to the caller of an [`Orchestrator`](crate::Orchestrator).
///
/// Per-file problems are never errors here; they are reported as
/// failures inside the [`RunReport`](crate::RunReport).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The argument record was rejected before any lane started.
    #[error(transparent)]
    InvalidArguments(#[from] ValidationError),

    #[error("orchestrator is already initialized")]
    AlreadyInitialized,

    #[error("orchestrator is not initialized")]
    NotInitialized,

    #[error("failed to spawn worker lane: {0}")]
    Spawn(#[source] std::io::Error),

    /// A lane stopped before acknowledging initialization.
    #[error("worker lane stopped during initialization")]
    LaneStopped,
}

impl ErrorCode for OrchestratorError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidArguments(_) => "RUN_INVALID_ARGUMENTS",
            Self::AlreadyInitialized => "RUN_ALREADY_INITIALIZED",
            Self::NotInitialized => "RUN_NOT_INITIALIZED",
            Self::Spawn(_) => "RUN_SPAWN",
            Self::LaneStopped => "RUN_LANE_STOPPED",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remod_types::assert_error_codes;

    #[test]
    fn all_codes_prefixed() {
        assert_error_codes(
            &[
                OrchestratorError::InvalidArguments(ValidationError::new("$.cb", "functions are not allowed")),
                OrchestratorError::AlreadyInitialized,
                OrchestratorError::NotInitialized,
                OrchestratorError::Spawn(std::io::Error::other("no threads")),
                OrchestratorError::LaneStopped,
            ],
            "RUN_",
        );
    }

    #[test]
    fn validation_message_is_kept() {
        let err = OrchestratorError::from(ValidationError::new("$.cb", "functions are not allowed"));
        assert!(err.to_string().contains("$.cb"), "{err}");
    }
}
