//! Generation Port — the single seam between the refinement engine and the
//! upstream text-generation service.
//!
//! ARCHITECTURAL RULE: no other module may talk to the upstream service
//! directly. Controllers call `GenerationPort::generate`; the concrete
//! adapter lives in `claude`. Swap in a stub implementation in tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::eval::ScoreReport;
use crate::models::{Candidate, Request};

pub mod claude;
pub mod prompts;

pub use claude::ClaudeGenerator;

/// Feedback folded into a revision call: the prior candidate plus the
/// evaluator's improvement suggestions.
#[derive(Debug, Clone)]
pub struct RevisionHint {
    pub prior_text: String,
    pub suggestions: Vec<String>,
}

impl RevisionHint {
    pub fn from_report(candidate: &Candidate, report: &ScoreReport) -> Self {
        Self {
            prior_text: candidate.text.clone(),
            suggestions: report.suggestions.clone(),
        }
    }
}

/// Failure modes of one generation call. The port performs no internal
/// retry; the controller owns retry policy and the per-call timeout.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("transport failure: {message}")]
    Transport { message: String, retryable: bool },

    #[error("generation call timed out after {0:?}")]
    Timeout(Duration),

    #[error("content policy refusal: {0}")]
    ContentPolicy(String),
}

impl GenerateError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerateError::Transport { retryable, .. } => *retryable,
            GenerateError::Timeout(_) => true,
            GenerateError::ContentPolicy(_) => false,
        }
    }
}

/// Produce candidate text for a structured request. `revision` is `None`
/// for the first iteration and carries the prior candidate's feedback on
/// every subsequent one.
#[async_trait]
pub trait GenerationPort: Send + Sync {
    async fn generate(
        &self,
        request: &Request,
        revision: Option<&RevisionHint>,
    ) -> Result<String, GenerateError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_retryability_classification() {
        assert!(GenerateError::Timeout(Duration::from_secs(60)).is_retryable());
        assert!(GenerateError::Transport {
            message: "503".to_string(),
            retryable: true
        }
        .is_retryable());
        assert!(!GenerateError::Transport {
            message: "400".to_string(),
            retryable: false
        }
        .is_retryable());
        assert!(!GenerateError::ContentPolicy("refused".to_string()).is_retryable());
    }

    #[test]
    fn test_revision_hint_carries_suggestions() {
        let candidate = Candidate {
            text: "draft prompt".to_string(),
            iteration: 1,
            controller_id: Uuid::new_v4(),
        };
        let report = ScoreReport {
            clarity: 4.0,
            specificity: 4.0,
            completeness: 4.0,
            efficiency: 4.0,
            reproducibility: 4.0,
            overall: 4.0,
            suggestions: vec!["add an output format".to_string()],
        };
        let hint = RevisionHint::from_report(&candidate, &report);
        assert_eq!(hint.prior_text, "draft prompt");
        assert_eq!(hint.suggestions.len(), 1);
    }
}
