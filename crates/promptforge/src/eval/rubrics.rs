//! The five default heuristic rubrics. All operate on the candidate text
//! alone (plus the request for constraint echoes) with keyword and shape
//! checks — fast, deterministic, and fully testable offline.

use crate::eval::{Axis, Rubric, RubricError};
use crate::models::Request;

fn check_non_empty(text: &str) -> Result<&str, RubricError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RubricError::EmptyText);
    }
    Ok(trimmed)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

// ────────────────────────────────────────────────────────────────────────────
// Clarity — sentence length and visible structure
// ────────────────────────────────────────────────────────────────────────────

pub struct ClarityRubric;

impl Rubric for ClarityRubric {
    fn axis(&self) -> Axis {
        Axis::Clarity
    }

    fn score(&self, text: &str, _request: &Request) -> Result<f64, RubricError> {
        let text = check_non_empty(text)?;
        let mut score = 8.0;

        let sentences: Vec<&str> = text
            .split(['.', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let avg_len = if sentences.is_empty() {
            text.len()
        } else {
            sentences.iter().map(|s| s.len()).sum::<usize>() / sentences.len()
        };

        if avg_len > 160 {
            score -= 2.0; // run-on sentences
        } else if avg_len < 15 {
            score -= 3.0; // fragments
        }

        // Labeled sections
        if text.contains("##") || text.lines().any(|l| l.trim_end().ends_with(':')) {
            score += 1.0;
        }
        // Bullet or numbered lists
        if contains_any(text, &["- ", "* ", "1. ", "2. "]) {
            score += 1.0;
        }

        Ok(score)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Specificity — quantifiable constraints and concrete shapes
// ────────────────────────────────────────────────────────────────────────────

pub struct SpecificityRubric;

const SPECIFIC_MARKERS: [&str; 7] = [
    "for example",
    "specifically",
    "such as",
    "format",
    "output",
    "structure",
    "following",
];

impl Rubric for SpecificityRubric {
    fn axis(&self) -> Axis {
        Axis::Specificity
    }

    fn score(&self, text: &str, _request: &Request) -> Result<f64, RubricError> {
        let text = check_non_empty(text)?;
        let lower = text.to_lowercase();
        let mut score = 4.0;

        let marker_hits = SPECIFIC_MARKERS
            .iter()
            .filter(|m| lower.contains(*m))
            .count();
        score += (marker_hits.min(4)) as f64;

        // Quantifiable constraints: any digit in the text
        if text.chars().any(|c| c.is_ascii_digit()) {
            score += 1.0;
        }
        // Code or schema examples
        if text.contains("```") || text.contains('{') {
            score += 1.0;
        }

        Ok(score)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Completeness — role, task, output, constraints, examples
// ────────────────────────────────────────────────────────────────────────────

pub struct CompletenessRubric;

impl Rubric for CompletenessRubric {
    fn axis(&self) -> Axis {
        Axis::Completeness
    }

    fn score(&self, text: &str, request: &Request) -> Result<f64, RubricError> {
        let text = check_non_empty(text)?;
        let lower = text.to_lowercase();
        let mut score = 2.0;

        let elements: [&[&str]; 4] = [
            &["you are", "expert", "engineer", "analyst", "specialist"], // role
            &["task", "objective", "perform", "produce", "goal"],        // task
            &["output", "result", "return", "format"],                   // output
            &["constraint", "requirement", "condition", "must not", "only use"], // constraints
        ];
        for keywords in elements {
            if contains_any(&lower, keywords) {
                score += 1.5;
            }
        }

        if contains_any(&lower, &["example", "e.g."]) {
            score += 1.0;
        }
        // Caller constraints echoed into the prompt
        if let Some(constraints) = &request.constraints {
            let c = constraints.to_lowercase();
            if !c.is_empty() && lower.contains(c.split_whitespace().next().unwrap_or("")) {
                score += 1.0;
            }
        }

        Ok(score)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Efficiency — length and redundancy penalties
// ────────────────────────────────────────────────────────────────────────────

pub struct EfficiencyRubric;

const REDUNDANT_PHRASES: [&str; 4] = [
    "in order to",
    "it should be noted",
    "as a matter of fact",
    "basically",
];

impl Rubric for EfficiencyRubric {
    fn axis(&self) -> Axis {
        Axis::Efficiency
    }

    fn score(&self, text: &str, _request: &Request) -> Result<f64, RubricError> {
        let text = check_non_empty(text)?;
        let lower = text.to_lowercase();
        let mut score = 8.0;

        if text.len() > 2000 {
            score -= 3.0;
        } else if text.len() < 50 {
            score -= 4.0;
        }

        let redundant_hits = REDUNDANT_PHRASES
            .iter()
            .filter(|p| lower.contains(*p))
            .count();
        score -= redundant_hits as f64;

        Ok(score)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reproducibility — determinism markers
// ────────────────────────────────────────────────────────────────────────────

pub struct ReproducibilityRubric;

impl Rubric for ReproducibilityRubric {
    fn axis(&self) -> Axis {
        Axis::Reproducibility
    }

    fn score(&self, text: &str, _request: &Request) -> Result<f64, RubricError> {
        let text = check_non_empty(text)?;
        let lower = text.to_lowercase();
        let mut score = 4.0;

        if contains_any(&lower, &["always", "must", "exactly", "consistently"]) {
            score += 2.0;
        }
        if lower.contains("format") {
            score += 2.0;
        }
        // Numbered procedure
        if lower.contains("1.") && lower.contains("2.") {
            score += 1.0;
        }
        if lower.contains("example") {
            score += 1.0;
        }

        Ok(score)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskType;

    fn request() -> Request {
        Request::new(TaskType::GeneralPoc, "prototype a report generator")
    }

    fn score_of(rubric: &dyn Rubric, text: &str) -> f64 {
        rubric.score(text, &request()).unwrap()
    }

    #[test]
    fn test_all_rubrics_reject_empty_text() {
        let rubrics: Vec<Box<dyn Rubric>> = vec![
            Box::new(ClarityRubric),
            Box::new(SpecificityRubric),
            Box::new(CompletenessRubric),
            Box::new(EfficiencyRubric),
            Box::new(ReproducibilityRubric),
        ];
        for rubric in &rubrics {
            assert!(
                rubric.score("  \n ", &request()).is_err(),
                "{} accepted empty text",
                rubric.axis().as_str()
            );
        }
    }

    #[test]
    fn test_clarity_rewards_structure() {
        let structured = "## Task\n- Summarize the report in plain language.\n- Keep each point short.";
        let wall = "summarize the report and make sure that everything that could possibly be relevant to anyone reading it later is included in a single continuous paragraph without any breaks whatsoever because structure is overrated";
        assert!(score_of(&ClarityRubric, structured) > score_of(&ClarityRubric, wall));
    }

    #[test]
    fn test_specificity_rewards_numbers_and_schemas() {
        let specific = "Return output in the following JSON format: {\"total\": 42}. For example, include 3 rows.";
        let vague = "give me something useful";
        assert!(score_of(&SpecificityRubric, specific) > score_of(&SpecificityRubric, vague));
    }

    #[test]
    fn test_completeness_detects_all_elements() {
        let full = "You are an expert analyst. Task: produce a summary. \
                    Output format: markdown table. Constraint: must not invent data. \
                    Example: | month | total |";
        let partial = "write a summary please";
        assert!(score_of(&CompletenessRubric, full) > score_of(&CompletenessRubric, partial));
    }

    #[test]
    fn test_completeness_rewards_echoed_constraints() {
        let req = Request::new(TaskType::DataAnalysis, "trend analysis")
            .with_constraints("anonymize customer names");
        let echoing = "You are an analyst. Task: analyze. Output: table. You must anonymize all fields.";
        let silent = "You are an analyst. Task: analyze. Output: table. You must be precise.";
        let with_echo = CompletenessRubric.score(echoing, &req).unwrap();
        let without = CompletenessRubric.score(silent, &req).unwrap();
        assert!(with_echo > without);
    }

    #[test]
    fn test_efficiency_penalizes_extremes() {
        let terse = "do it";
        let bloated = "x".repeat(2500);
        let reasonable = "Summarize the attached sales data as a five-row table with one insight per row.";
        assert!(score_of(&EfficiencyRubric, reasonable) > score_of(&EfficiencyRubric, terse));
        assert!(score_of(&EfficiencyRubric, reasonable) > score_of(&EfficiencyRubric, &bloated));
    }

    #[test]
    fn test_efficiency_penalizes_redundant_phrases() {
        let redundant =
            "In order to do this, it should be noted that basically you summarize the data table.";
        let direct = "Summarize the data table into five labeled rows with totals.";
        assert!(score_of(&EfficiencyRubric, direct) > score_of(&EfficiencyRubric, redundant));
    }

    #[test]
    fn test_reproducibility_rewards_pinned_format_and_steps() {
        let pinned = "Always return exactly this format: CSV. Steps: 1. load 2. aggregate. Example: a,b";
        let loose = "maybe write something about the data";
        assert!(
            score_of(&ReproducibilityRubric, pinned) > score_of(&ReproducibilityRubric, loose)
        );
    }

    #[test]
    fn test_scores_fit_evaluator_clamp_range() {
        // Raw rubric output may exceed 10 before the evaluator clamps; it
        // must never go negative by more than the clamp can absorb.
        let minimal = score_of(&EfficiencyRubric, "hi");
        assert!(minimal >= 0.0);
    }
}
