use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::artifact::{Artifact, TerminationReason};
use crate::models::request::Request;

/// One batch submission: an ordered list of requests plus the knobs that
/// govern every controller spawned for it. Owned by the scheduler for the
/// job's lifetime.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub requests: Vec<Request>,
    pub config: EngineConfig,
}

impl BatchJob {
    pub fn new(requests: Vec<Request>, config: EngineConfig) -> Self {
        Self { requests, config }
    }
}

/// Why a single request produced no Artifact. Isolated per request; a
/// failure here never aborts siblings in the same batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum FailureCause {
    /// Retries exhausted before any candidate was scored.
    GenerationFailed(String),
    /// The upstream refused the request; never retried.
    ContentPolicy(String),
    /// The batch was cancelled before this controller issued its next call.
    Cancelled,
    /// Controller task fault (panic or join error).
    Internal(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub request_id: Uuid,
    pub cause: FailureCause,
}

/// Aggregate iteration accounting across one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationStats {
    pub total_iterations: u32,
    pub max_iterations: u32,
    pub average_iterations: f64,
    pub accepted: usize,
    pub exhausted: usize,
}

impl IterationStats {
    pub fn from_artifacts<'a>(artifacts: impl Iterator<Item = &'a Artifact>) -> Self {
        let mut stats = IterationStats::default();
        let mut count = 0usize;

        for artifact in artifacts {
            count += 1;
            stats.total_iterations += artifact.iteration_count;
            stats.max_iterations = stats.max_iterations.max(artifact.iteration_count);
            if artifact.reason == TerminationReason::Accepted {
                stats.accepted += 1;
            } else {
                stats.exhausted += 1;
            }
        }

        if count > 0 {
            stats.average_iterations = f64::from(stats.total_iterations) / count as f64;
        }
        stats
    }
}

/// The scheduler's answer to one `submit()`: every request resolved to
/// either an Artifact or a Failure, plus wall-clock and iteration totals.
#[derive(Debug)]
pub struct BatchReport {
    pub artifacts: HashMap<Uuid, Artifact>,
    pub failures: HashMap<Uuid, Failure>,
    pub elapsed: Duration,
    pub iteration_stats: IterationStats,
}

impl BatchReport {
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}
