//! Refinement Controller — the per-request state machine.
//!
//! Flow: `Init → Generating → Evaluating → {Accepted | Revising | Exhausted}`.
//! One controller runs strictly sequentially; its only suspension points
//! are the Generation Port call and retry backoff. Terminal states build
//! the Artifact from the best-scoring candidate seen so far (ranked by
//! [`crate::eval::compare_scored`]), not necessarily the last one.
//!
//! `Exhausted` is a degraded success — it still yields an Artifact. The
//! controller errors only when nothing scoreable was ever produced
//! (generation failure on iteration one, policy refusal, cancellation).

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::ControllerError;
use crate::eval::{compare_scored, Evaluate, ScoreReport};
use crate::generation::{GenerateError, GenerationPort, RevisionHint};
use crate::models::{Artifact, Candidate, Request, TerminationReason};

const BACKOFF_BASE_MS: u64 = 500;

/// The explicit state machine. Tagged so tests can assert on transitions
/// without touching a real generation service.
#[derive(Debug)]
enum ControllerState {
    Init,
    Generating { hint: Option<RevisionHint> },
    Evaluating { candidate: Candidate },
    Revising { candidate: Candidate, report: ScoreReport },
    Accepted,
    Exhausted(TerminationReason),
}

pub struct RefinementController {
    id: Uuid,
    request: Request,
    config: EngineConfig,
    port: Arc<dyn GenerationPort>,
    evaluator: Arc<dyn Evaluate>,
}

impl RefinementController {
    pub fn new(
        request: Request,
        config: EngineConfig,
        port: Arc<dyn GenerationPort>,
        evaluator: Arc<dyn Evaluate>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            config,
            port,
            evaluator,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drives the loop to a terminal state. `cancel` is checked
    /// immediately before every new Generation Port call (including
    /// retries); a dispatched call always runs to completion or timeout.
    pub async fn run(self, cancel: watch::Receiver<bool>) -> Result<Artifact, ControllerError> {
        let mut state = ControllerState::Init;
        let mut scored_iterations: u32 = 0;
        let mut best: Option<(Candidate, ScoreReport)> = None;

        loop {
            state = match state {
                ControllerState::Init => ControllerState::Generating { hint: None },

                ControllerState::Generating { hint } => {
                    let iteration = scored_iterations + 1;
                    match self
                        .generate_with_retries(hint.as_ref(), iteration, &cancel)
                        .await
                    {
                        Ok(text) => ControllerState::Evaluating {
                            candidate: Candidate {
                                text,
                                iteration,
                                controller_id: self.id,
                            },
                        },
                        Err(GenerationOutcome::PolicyRefusal(detail)) => {
                            warn!(
                                controller_id = %self.id,
                                request_id = %self.request.request_id,
                                "content policy refusal; terminating without retry"
                            );
                            return Err(ControllerError::ContentPolicy(detail));
                        }
                        Err(GenerationOutcome::Cancelled) => {
                            return Err(ControllerError::Cancelled);
                        }
                        Err(GenerationOutcome::Exhausted { attempts, last }) => {
                            if best.is_some() {
                                // Degraded success: fall back to the best
                                // candidate already scored.
                                warn!(
                                    controller_id = %self.id,
                                    attempts,
                                    error = %last,
                                    "generation failed mid-loop; finishing with best-seen candidate"
                                );
                                ControllerState::Exhausted(TerminationReason::GenerationFailed)
                            } else {
                                return Err(ControllerError::GenerationFailed {
                                    attempts,
                                    source: last,
                                });
                            }
                        }
                    }
                }

                ControllerState::Evaluating { candidate } => {
                    let report = self.evaluator.evaluate(&candidate, &self.request);
                    scored_iterations += 1;
                    debug!(
                        controller_id = %self.id,
                        iteration = candidate.iteration,
                        overall = report.overall,
                        "candidate scored"
                    );

                    let prior_best_overall = best.as_ref().map(|(_, r)| r.overall);
                    let is_new_best = match &best {
                        None => true,
                        Some((bc, br)) => {
                            compare_scored((&candidate, &report), (bc, br)) == Ordering::Greater
                        }
                    };
                    if is_new_best {
                        best = Some((candidate.clone(), report.clone()));
                    }

                    if report.overall >= self.config.quality_threshold {
                        ControllerState::Accepted
                    } else if scored_iterations >= self.config.max_iterations {
                        ControllerState::Exhausted(TerminationReason::MaxIterationsReached)
                    } else if prior_best_overall
                        .is_some_and(|prev| report.overall - prev < self.config.min_delta)
                    {
                        ControllerState::Exhausted(TerminationReason::NoImprovement)
                    } else {
                        ControllerState::Revising { candidate, report }
                    }
                }

                ControllerState::Revising { candidate, report } => {
                    let hint = RevisionHint::from_report(&candidate, &report);
                    ControllerState::Generating { hint: Some(hint) }
                }

                ControllerState::Accepted => {
                    return Ok(self.build_artifact(
                        best,
                        scored_iterations,
                        TerminationReason::Accepted,
                    ));
                }

                ControllerState::Exhausted(reason) => {
                    return Ok(self.build_artifact(best, scored_iterations, reason));
                }
            };
        }
    }

    fn build_artifact(
        &self,
        best: Option<(Candidate, ScoreReport)>,
        scored_iterations: u32,
        reason: TerminationReason,
    ) -> Artifact {
        // Terminal states are only reachable after at least one candidate
        // was scored, so `best` is populated here.
        let (candidate, report) = best.unwrap_or_else(|| {
            (
                Candidate {
                    text: String::new(),
                    iteration: 0,
                    controller_id: self.id,
                },
                ScoreReport {
                    clarity: 0.0,
                    specificity: 0.0,
                    completeness: 0.0,
                    efficiency: 0.0,
                    reproducibility: 0.0,
                    overall: 0.0,
                    suggestions: vec![],
                },
            )
        });

        info!(
            controller_id = %self.id,
            request_id = %self.request.request_id,
            iterations = scored_iterations,
            overall = report.overall,
            reason = ?reason,
            "refinement finished"
        );

        Artifact {
            candidate,
            report,
            iteration_count: scored_iterations,
            reason,
        }
    }

    /// One logical generation: the initial attempt plus up to
    /// `max_retries` retries with exponential backoff. Each attempt runs
    /// under the per-call timeout; a timeout counts as a retryable fault.
    async fn generate_with_retries(
        &self,
        hint: Option<&RevisionHint>,
        iteration: u32,
        cancel: &watch::Receiver<bool>,
    ) -> Result<String, GenerationOutcome> {
        let mut last_error: Option<GenerateError> = None;
        let mut attempts: u32 = 0;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(BACKOFF_BASE_MS * (1 << (attempt - 1)));
                warn!(
                    controller_id = %self.id,
                    iteration,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "generation attempt failed; backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }

            if *cancel.borrow() {
                return Err(GenerationOutcome::Cancelled);
            }
            attempts += 1;

            let call = self.port.generate(&self.request, hint);
            let result = match tokio::time::timeout(self.config.generation_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(GenerateError::Timeout(self.config.generation_timeout)),
            };

            match result {
                Ok(text) => return Ok(text),
                Err(GenerateError::ContentPolicy(detail)) => {
                    return Err(GenerationOutcome::PolicyRefusal(detail));
                }
                Err(err) if err.is_retryable() => {
                    last_error = Some(err);
                }
                Err(err) => {
                    // Non-retryable transport fault: give up immediately.
                    return Err(GenerationOutcome::Exhausted {
                        attempts,
                        last: err,
                    });
                }
            }
        }

        Err(GenerationOutcome::Exhausted {
            attempts,
            last: last_error.unwrap_or(GenerateError::Transport {
                message: "no attempt was made".to_string(),
                retryable: false,
            }),
        })
    }
}

enum GenerationOutcome {
    PolicyRefusal(String),
    Cancelled,
    Exhausted { attempts: u32, last: GenerateError },
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskType;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    /// Scripted Generation Port: plays back one step per call.
    enum Step {
        Text(&'static str),
        Fail(GenerateError),
        Hang,
    }

    struct ScriptPort {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicU32,
    }

    impl ScriptPort {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationPort for ScriptPort {
        async fn generate(
            &self,
            _request: &Request,
            _revision: Option<&RevisionHint>,
        ) -> Result<String, GenerateError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Text(t)) => Ok(t.to_string()),
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Hang) | None => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(GenerateError::Transport {
                        message: "hung call woke up".to_string(),
                        retryable: false,
                    })
                }
            }
        }
    }

    /// Scripted evaluator: plays back one overall score per call and
    /// mirrors it onto every axis.
    struct ScriptEvaluator {
        scores: Mutex<VecDeque<f64>>,
    }

    impl ScriptEvaluator {
        fn new(scores: Vec<f64>) -> Arc<Self> {
            Arc::new(Self {
                scores: Mutex::new(scores.into()),
            })
        }
    }

    impl Evaluate for ScriptEvaluator {
        fn evaluate(&self, _candidate: &Candidate, _request: &Request) -> ScoreReport {
            let score = self.scores.lock().unwrap().pop_front().unwrap_or(0.0);
            ScoreReport {
                clarity: score,
                specificity: score,
                completeness: score,
                efficiency: score,
                reproducibility: score,
                overall: score,
                suggestions: vec!["tighten it up".to_string()],
            }
        }
    }

    fn request() -> Request {
        Request::new(TaskType::DataAnalysis, "summarize monthly sales trend")
    }

    fn no_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the test's duration.
        std::mem::forget(tx);
        rx
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[tokio::test]
    async fn test_zero_threshold_accepts_in_one_iteration() {
        let port = ScriptPort::new(vec![Step::Text("anything")]);
        let evaluator = ScriptEvaluator::new(vec![0.0]);
        let controller = RefinementController::new(
            request(),
            config().with_quality_threshold(0.0),
            port.clone(),
            evaluator,
        );

        let artifact = controller.run(no_cancel()).await.unwrap();
        assert_eq!(artifact.iteration_count, 1);
        assert_eq!(artifact.reason, TerminationReason::Accepted);
        assert_eq!(port.calls(), 1);
    }

    // Scores [3, 6] against threshold 5: the revision pass crosses the
    // threshold and is accepted.
    #[tokio::test]
    async fn test_accepts_on_second_iteration_when_score_crosses_threshold() {
        let port = ScriptPort::new(vec![Step::Text("draft one"), Step::Text("draft two")]);
        let evaluator = ScriptEvaluator::new(vec![3.0, 6.0]);
        let controller = RefinementController::new(
            request(),
            config().with_quality_threshold(5.0).with_max_iterations(2),
            port,
            evaluator,
        );

        let artifact = controller.run(no_cancel()).await.unwrap();
        assert_eq!(artifact.reason, TerminationReason::Accepted);
        assert_eq!(artifact.iteration_count, 2);
        assert_eq!(artifact.overall(), 6.0);
        assert_eq!(artifact.candidate.iteration, 2);
        assert_eq!(artifact.candidate.text, "draft two");
    }

    // A stub that always scores 2 exhausts the iteration budget, and the
    // tie-break (equal overall and completeness) selects the lower
    // iteration index.
    #[tokio::test]
    async fn test_flat_scores_exhaust_and_tiebreak_picks_earlier_candidate() {
        let port = ScriptPort::new(vec![Step::Text("alpha"), Step::Text("beta")]);
        let evaluator = ScriptEvaluator::new(vec![2.0, 2.0]);
        let controller = RefinementController::new(
            request(),
            config()
                .with_quality_threshold(5.0)
                .with_max_iterations(2)
                .with_min_delta(0.0),
            port,
            evaluator,
        );

        let artifact = controller.run(no_cancel()).await.unwrap();
        assert_eq!(artifact.reason, TerminationReason::MaxIterationsReached);
        assert_eq!(artifact.iteration_count, 2);
        assert_eq!(artifact.candidate.iteration, 1);
        assert_eq!(artifact.candidate.text, "alpha");
    }

    #[tokio::test]
    async fn test_iteration_count_never_exceeds_budget() {
        let port = ScriptPort::new(vec![
            Step::Text("one"),
            Step::Text("two"),
            Step::Text("three"),
        ]);
        let evaluator = ScriptEvaluator::new(vec![1.0, 2.0, 3.0]);
        let controller = RefinementController::new(
            request(),
            config().with_quality_threshold(9.0).with_max_iterations(3),
            port,
            evaluator,
        );

        let artifact = controller.run(no_cancel()).await.unwrap();
        assert_eq!(artifact.reason, TerminationReason::MaxIterationsReached);
        assert_eq!(artifact.iteration_count, 3);
        // Best seen is the highest scorer, here the last.
        assert_eq!(artifact.candidate.text, "three");
    }

    #[tokio::test]
    async fn test_stalled_improvement_stops_with_no_improvement() {
        let port = ScriptPort::new(vec![Step::Text("one"), Step::Text("two")]);
        let evaluator = ScriptEvaluator::new(vec![3.0, 3.05]);
        let controller = RefinementController::new(
            request(),
            config()
                .with_quality_threshold(9.0)
                .with_max_iterations(5)
                .with_min_delta(0.1),
            port,
            evaluator,
        );

        let artifact = controller.run(no_cancel()).await.unwrap();
        assert_eq!(artifact.reason, TerminationReason::NoImprovement);
        assert_eq!(artifact.iteration_count, 2);
        // 3.05 still beats 3.0, so best-seen is iteration 2.
        assert_eq!(artifact.candidate.iteration, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failures_are_retried_with_backoff() {
        let port = ScriptPort::new(vec![
            Step::Fail(GenerateError::Transport {
                message: "connection reset".to_string(),
                retryable: true,
            }),
            Step::Fail(GenerateError::Transport {
                message: "503".to_string(),
                retryable: true,
            }),
            Step::Text("finally"),
        ]);
        let evaluator = ScriptEvaluator::new(vec![9.0]);
        let controller = RefinementController::new(
            request(),
            config().with_max_retries(3),
            port.clone(),
            evaluator,
        );

        let artifact = controller.run(no_cancel()).await.unwrap();
        assert_eq!(artifact.reason, TerminationReason::Accepted);
        assert_eq!(port.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_before_any_candidate_is_a_failure() {
        let failing = || {
            Step::Fail(GenerateError::Transport {
                message: "unreachable".to_string(),
                retryable: true,
            })
        };
        let port = ScriptPort::new(vec![failing(), failing(), failing()]);
        let evaluator = ScriptEvaluator::new(vec![]);
        let controller = RefinementController::new(
            request(),
            config().with_max_retries(2),
            port.clone(),
            evaluator,
        );

        let err = controller.run(no_cancel()).await.unwrap_err();
        match err {
            ControllerError::GenerationFailed { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected GenerationFailed, got {other:?}"),
        }
        assert_eq!(port.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_loop_generation_failure_degrades_to_best_seen() {
        let failing = || {
            Step::Fail(GenerateError::Transport {
                message: "gone away".to_string(),
                retryable: true,
            })
        };
        let port = ScriptPort::new(vec![Step::Text("only draft"), failing(), failing()]);
        let evaluator = ScriptEvaluator::new(vec![4.0]);
        let controller = RefinementController::new(
            request(),
            config()
                .with_quality_threshold(9.0)
                .with_max_iterations(3)
                .with_max_retries(1),
            port,
            evaluator,
        );

        let artifact = controller.run(no_cancel()).await.unwrap();
        assert_eq!(artifact.reason, TerminationReason::GenerationFailed);
        assert_eq!(artifact.candidate.text, "only draft");
        assert_eq!(artifact.iteration_count, 1);
    }

    #[tokio::test]
    async fn test_content_policy_is_never_retried() {
        let port = ScriptPort::new(vec![Step::Fail(GenerateError::ContentPolicy(
            "refused".to_string(),
        ))]);
        let evaluator = ScriptEvaluator::new(vec![]);
        let controller =
            RefinementController::new(request(), config().with_max_retries(5), port.clone(), evaluator);

        let err = controller.run(no_cancel()).await.unwrap_err();
        assert!(matches!(err, ControllerError::ContentPolicy(_)));
        assert_eq!(port.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_retryable_failure() {
        let port = ScriptPort::new(vec![Step::Hang, Step::Text("after timeout")]);
        let evaluator = ScriptEvaluator::new(vec![9.0]);
        let controller = RefinementController::new(
            request(),
            config().with_max_retries(1),
            port.clone(),
            evaluator,
        );

        let artifact = controller.run(no_cancel()).await.unwrap();
        assert_eq!(artifact.reason, TerminationReason::Accepted);
        assert_eq!(port.calls(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_call_issues_no_calls() {
        let port = ScriptPort::new(vec![Step::Text("never used")]);
        let evaluator = ScriptEvaluator::new(vec![]);
        let controller = RefinementController::new(request(), config(), port.clone(), evaluator);

        let (tx, rx) = watch::channel(true);
        drop(tx);
        let err = controller.run(rx).await.unwrap_err();
        assert!(matches!(err, ControllerError::Cancelled));
        assert_eq!(port.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_retryable_transport_fault_gives_up_immediately() {
        let port = ScriptPort::new(vec![Step::Fail(GenerateError::Transport {
            message: "invalid request".to_string(),
            retryable: false,
        })]);
        let evaluator = ScriptEvaluator::new(vec![]);
        let controller =
            RefinementController::new(request(), config().with_max_retries(5), port.clone(), evaluator);

        let err = controller.run(no_cancel()).await.unwrap_err();
        match err {
            ControllerError::GenerationFailed { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("expected GenerationFailed, got {other:?}"),
        }
        assert_eq!(port.calls(), 1);
    }
}
