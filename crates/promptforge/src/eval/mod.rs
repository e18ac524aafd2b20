//! Evaluation Function — deterministic multi-axis scoring of candidates.
//!
//! Five axes (clarity, specificity, completeness, efficiency,
//! reproducibility), each computed by a pluggable [`Rubric`] strategy.
//! The fixed contract is aggregation: `overall` is a weighted mean over
//! [`ScoreWeights`]. No randomness, no clock reads — re-scoring a stored
//! candidate reproduces a bit-identical [`ScoreReport`].
//!
//! Swap rubrics (or the whole [`Evaluate`] impl) without touching the
//! controller or scheduler; both hold an `Arc<dyn Evaluate>`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::models::{Candidate, Request};

pub mod rubrics;

pub use rubrics::{
    ClarityRubric, CompletenessRubric, EfficiencyRubric, ReproducibilityRubric, SpecificityRubric,
};

/// Subscores below this contribute an improvement suggestion.
pub const SUGGESTION_THRESHOLD: f64 = 7.0;

// ────────────────────────────────────────────────────────────────────────────
// Score data models
// ────────────────────────────────────────────────────────────────────────────

/// One candidate's full evaluation. 1:1 with the candidate that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub clarity: f64,
    pub specificity: f64,
    pub completeness: f64,
    pub efficiency: f64,
    pub reproducibility: f64,
    /// Weighted mean of the five subscores, in [0, 10].
    pub overall: f64,
    pub suggestions: Vec<String>,
}

/// The five scoring axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Clarity,
    Specificity,
    Completeness,
    Efficiency,
    Reproducibility,
}

impl Axis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Clarity => "clarity",
            Axis::Specificity => "specificity",
            Axis::Completeness => "completeness",
            Axis::Efficiency => "efficiency",
            Axis::Reproducibility => "reproducibility",
        }
    }
}

/// Per-axis aggregation weights. Defaults to equal weighting.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub clarity: f64,
    pub specificity: f64,
    pub completeness: f64,
    pub efficiency: f64,
    pub reproducibility: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            clarity: 0.2,
            specificity: 0.2,
            completeness: 0.2,
            efficiency: 0.2,
            reproducibility: 0.2,
        }
    }
}

impl ScoreWeights {
    fn sum(&self) -> f64 {
        self.clarity + self.specificity + self.completeness + self.efficiency + self.reproducibility
    }

    fn for_axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Clarity => self.clarity,
            Axis::Specificity => self.specificity,
            Axis::Completeness => self.completeness,
            Axis::Efficiency => self.efficiency,
            Axis::Reproducibility => self.reproducibility,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Traits
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RubricError {
    #[error("candidate text is empty")]
    EmptyText,
}

/// One axis-scoring strategy. Must be deterministic: same (text, request)
/// in, same score out.
pub trait Rubric: Send + Sync {
    fn axis(&self) -> Axis;
    /// Returns a score in [0, 10]. A malformed candidate yields an error;
    /// the evaluator records 0.0 for the axis and continues.
    fn score(&self, text: &str, request: &Request) -> Result<f64, RubricError>;
}

/// The evaluation seam the controller depends on. Pure: no I/O, no hidden
/// state mutation.
pub trait Evaluate: Send + Sync {
    fn evaluate(&self, candidate: &Candidate, request: &Request) -> ScoreReport;
}

// ────────────────────────────────────────────────────────────────────────────
// RubricEvaluator — default implementation
// ────────────────────────────────────────────────────────────────────────────

/// Default evaluator: the five heuristic rubrics from `rubrics`, aggregated
/// by weighted mean.
pub struct RubricEvaluator {
    weights: ScoreWeights,
    rubrics: Vec<Box<dyn Rubric>>,
}

impl RubricEvaluator {
    pub fn new(weights: ScoreWeights) -> Self {
        Self::with_rubrics(
            weights,
            vec![
                Box::new(ClarityRubric),
                Box::new(SpecificityRubric),
                Box::new(CompletenessRubric),
                Box::new(EfficiencyRubric),
                Box::new(ReproducibilityRubric),
            ],
        )
    }

    /// Custom rubric set. The last rubric registered for an axis wins.
    pub fn with_rubrics(weights: ScoreWeights, rubrics: Vec<Box<dyn Rubric>>) -> Self {
        Self { weights, rubrics }
    }
}

impl Default for RubricEvaluator {
    fn default() -> Self {
        Self::new(ScoreWeights::default())
    }
}

impl Evaluate for RubricEvaluator {
    fn evaluate(&self, candidate: &Candidate, request: &Request) -> ScoreReport {
        let mut report = ScoreReport {
            clarity: 0.0,
            specificity: 0.0,
            completeness: 0.0,
            efficiency: 0.0,
            reproducibility: 0.0,
            overall: 0.0,
            suggestions: vec![],
        };

        let mut weighted_sum = 0.0;
        for rubric in &self.rubrics {
            let axis = rubric.axis();
            let score = match rubric.score(&candidate.text, request) {
                Ok(s) => s.clamp(0.0, 10.0),
                Err(e) => {
                    warn!(
                        axis = axis.as_str(),
                        iteration = candidate.iteration,
                        error = %e,
                        "rubric could not score candidate; recording 0.0"
                    );
                    0.0
                }
            };
            match axis {
                Axis::Clarity => report.clarity = score,
                Axis::Specificity => report.specificity = score,
                Axis::Completeness => report.completeness = score,
                Axis::Efficiency => report.efficiency = score,
                Axis::Reproducibility => report.reproducibility = score,
            }
            weighted_sum += score * self.weights.for_axis(axis);
        }

        let weight_total = self.weights.sum();
        report.overall = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };
        report.suggestions = suggestions_for(&report, &candidate.text);
        report
    }
}

/// One concrete suggestion per weak axis, for the revision prompt.
fn suggestions_for(report: &ScoreReport, text: &str) -> Vec<String> {
    let mut suggestions = Vec::new();

    if report.clarity < SUGGESTION_THRESHOLD {
        suggestions.push(
            "Structure the prompt into clearly labeled sections with shorter sentences".to_string(),
        );
    }
    if report.specificity < SUGGESTION_THRESHOLD {
        suggestions
            .push("Add concrete examples and an explicit expected output format".to_string());
    }
    if report.completeness < SUGGESTION_THRESHOLD {
        suggestions.push(
            "State the role, the task, the output requirements, and the constraints explicitly"
                .to_string(),
        );
    }
    if report.efficiency < SUGGESTION_THRESHOLD {
        if text.len() > 1500 {
            suggestions.push("Shorten the prompt and remove redundant phrasing".to_string());
        } else {
            suggestions
                .push("Reorganize so the essential instructions come first".to_string());
        }
    }
    if report.reproducibility < SUGGESTION_THRESHOLD {
        suggestions.push(
            "Pin down the output format and add numbered steps so results are repeatable"
                .to_string(),
        );
    }

    suggestions
}

// ────────────────────────────────────────────────────────────────────────────
// Cross-candidate ordering
// ────────────────────────────────────────────────────────────────────────────

/// Total order over scored candidates; `Greater` means `a` is the better
/// pick. Ties break by higher completeness, then lower iteration index,
/// then lexicographically smaller text — so best-artifact selection is
/// reproducible across runs.
pub fn compare_scored(
    a: (&Candidate, &ScoreReport),
    b: (&Candidate, &ScoreReport),
) -> Ordering {
    a.1.overall
        .total_cmp(&b.1.overall)
        .then(a.1.completeness.total_cmp(&b.1.completeness))
        .then(b.0.iteration.cmp(&a.0.iteration))
        .then(b.0.text.cmp(&a.0.text))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
