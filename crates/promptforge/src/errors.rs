use thiserror::Error;

use crate::generation::GenerateError;
use crate::models::FailureCause;

/// Terminal failure of a single refinement controller. The scheduler
/// converts these into per-request [`crate::models::Failure`] records;
/// they never propagate to abort sibling requests.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Retries exhausted (or a non-retryable transport fault) before any
    /// candidate was scored, so no degraded Artifact can be built.
    #[error("generation failed after {attempts} attempt(s): {source}")]
    GenerationFailed {
        attempts: u32,
        #[source]
        source: GenerateError,
    },

    /// Upstream refusal. Surfaced distinctly and never retried.
    #[error("content policy refusal: {0}")]
    ContentPolicy(String),

    /// The batch was cancelled before this controller's next port call.
    #[error("cancelled before completion")]
    Cancelled,
}

impl From<ControllerError> for FailureCause {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::GenerationFailed { .. } => FailureCause::GenerationFailed(err.to_string()),
            ControllerError::ContentPolicy(detail) => FailureCause::ContentPolicy(detail),
            ControllerError::Cancelled => FailureCause::Cancelled,
        }
    }
}
