use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::eval::ScoreReport;

/// A generated-but-not-yet-accepted prompt text. Owned exclusively by the
/// controller that produced it; discarded after scoring unless it ends up
/// as the accepted [`Artifact`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    /// 1-based; strictly increases within one controller run.
    pub iteration: u32,
    pub controller_id: Uuid,
}

/// Why a refinement loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Accepted,
    MaxIterationsReached,
    NoImprovement,
    GenerationFailed,
}

/// The final output of one refinement cycle — the best-scoring candidate
/// seen across all iterations, its score, and why the loop stopped.
/// Immutable once committed; the only unit the History Store persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub candidate: Candidate,
    pub report: ScoreReport,
    /// Number of candidates that were generated and scored.
    pub iteration_count: u32,
    pub reason: TerminationReason,
}

impl Artifact {
    pub fn overall(&self) -> f64 {
        self.report.overall
    }

    /// Degraded-success results (`Exhausted` in the state machine) still
    /// produce an Artifact; this distinguishes them from accepted ones.
    pub fn is_accepted(&self) -> bool {
        self.reason == TerminationReason::Accepted
    }
}
