//! Batch Scheduler — fans a [`BatchJob`] out over refinement controllers
//! under a bounded concurrency limit and joins the results into one
//! [`BatchReport`].
//!
//! Isolation rule: one controller's failure (or panic) never aborts its
//! siblings. Every request in the job resolves to exactly one Artifact or
//! one Failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::controller::RefinementController;
use crate::errors::ControllerError;
use crate::eval::Evaluate;
use crate::generation::GenerationPort;
use crate::history::HistoryStore;
use crate::models::{
    Artifact, BatchJob, BatchReport, Failure, FailureCause, IterationStats, Request,
};

/// Flips the shared cancellation flag for one batch. Cancellation is
/// cooperative: in-flight generation calls finish, controllers stop before
/// their next port call.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

pub fn cancel_channel() -> (CancelHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, rx)
}

pub struct BatchScheduler {
    port: Arc<dyn GenerationPort>,
    evaluator: Arc<dyn Evaluate>,
    history: Arc<dyn HistoryStore>,
}

impl BatchScheduler {
    pub fn new(
        port: Arc<dyn GenerationPort>,
        evaluator: Arc<dyn Evaluate>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            port,
            evaluator,
            history,
        }
    }

    /// Runs the batch to completion with no external cancellation.
    pub async fn submit(&self, job: BatchJob) -> BatchReport {
        let (_handle, cancel) = cancel_channel();
        self.submit_with_cancel(job, cancel).await
    }

    /// Runs the batch to completion. Flip `cancel` (via [`CancelHandle`])
    /// to stop controllers before their next generation call; requests
    /// already finished keep their results.
    pub async fn submit_with_cancel(
        &self,
        job: BatchJob,
        cancel: watch::Receiver<bool>,
    ) -> BatchReport {
        let started = Instant::now();
        let total = job.requests.len();
        info!(
            requests = total,
            concurrency_limit = job.config.concurrency_limit,
            "batch submitted"
        );

        // `max(1)` so a misconfigured zero limit cannot deadlock the batch.
        let semaphore = Arc::new(Semaphore::new(job.config.concurrency_limit.max(1)));
        let mut tasks: JoinSet<(Request, Result<Artifact, ControllerError>)> = JoinSet::new();
        // Maps each task back to its request, so even a panicking task's
        // failure lands under the right request id.
        let mut task_requests: HashMap<tokio::task::Id, Uuid> = HashMap::new();

        for request in job.requests {
            let request_id = request.request_id;
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let config = job.config.clone();
            let port = self.port.clone();
            let evaluator = self.evaluator.clone();

            let handle = tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (request, Err(ControllerError::Cancelled)),
                };
                let controller =
                    RefinementController::new(request.clone(), config, port, evaluator);
                let result = controller.run(cancel).await;
                (request, result)
            });
            task_requests.insert(handle.id(), request_id);
        }

        let mut report = BatchReport {
            artifacts: Default::default(),
            failures: Default::default(),
            elapsed: Default::default(),
            iteration_stats: IterationStats::default(),
        };

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (request, Ok(artifact)))) => {
                    self.persist(&request, &artifact).await;
                    report.artifacts.insert(request.request_id, artifact);
                }
                Ok((_, (request, Err(err)))) => {
                    warn!(request_id = %request.request_id, error = %err, "request failed");
                    report.failures.insert(
                        request.request_id,
                        Failure {
                            request_id: request.request_id,
                            cause: err.into(),
                        },
                    );
                }
                Err(join_err) => {
                    let request_id = task_requests
                        .get(&join_err.id())
                        .copied()
                        .unwrap_or_else(Uuid::new_v4);
                    error!(%request_id, error = %join_err, "controller task fault");
                    report.failures.insert(
                        request_id,
                        Failure {
                            request_id,
                            cause: FailureCause::Internal(join_err.to_string()),
                        },
                    );
                }
            }
        }

        report.iteration_stats = IterationStats::from_artifacts(report.artifacts.values());
        report.elapsed = started.elapsed();
        info!(
            succeeded = report.artifacts.len(),
            failed = report.failures.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "batch finished"
        );
        report
    }

    /// Best-effort persistence: a store fault costs the history entry, not
    /// the caller's artifact.
    async fn persist(&self, request: &Request, artifact: &Artifact) {
        if let Err(e) = self.history.put(request, artifact.clone()).await {
            warn!(
                request_id = %request.request_id,
                error = %e,
                "failed to persist artifact to history"
            );
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
