//! promptforge — iterative prompt synthesis and refinement.
//!
//! A caller submits structured requests describing a task; the engine
//! drives a generate → evaluate → revise loop per request until the
//! candidate prompt clears a quality threshold or the iteration budget
//! runs out, then persists the best result.
//!
//! The moving parts:
//! - [`generation`]: the [`generation::GenerationPort`] seam and the
//!   Claude adapter behind it.
//! - [`eval`]: deterministic five-axis scoring with pluggable rubrics.
//! - [`controller`]: the per-request refinement state machine.
//! - [`scheduler`]: fans batches out under a concurrency limit and joins
//!   per-request results.
//! - [`history`]: fingerprint-keyed, score-monotonic persistence.
//!
//! ```no_run
//! use std::sync::Arc;
//! use promptforge::config::EngineConfig;
//! use promptforge::eval::RubricEvaluator;
//! use promptforge::generation::ClaudeGenerator;
//! use promptforge::history::InMemoryHistory;
//! use promptforge::models::{BatchJob, Request, TaskType};
//! use promptforge::scheduler::BatchScheduler;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let scheduler = BatchScheduler::new(
//!     Arc::new(ClaudeGenerator::from_env()?),
//!     Arc::new(RubricEvaluator::default()),
//!     Arc::new(InMemoryHistory::new()),
//! );
//!
//! let job = BatchJob::new(
//!     vec![Request::new(TaskType::DataAnalysis, "summarize monthly sales trend")],
//!     EngineConfig::from_env()?,
//! );
//! let report = scheduler.submit(job).await;
//! println!("{} artifact(s), {} failure(s)", report.artifacts.len(), report.failures.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod errors;
pub mod eval;
pub mod generation;
pub mod history;
pub mod models;
pub mod scheduler;

pub use config::EngineConfig;
pub use controller::RefinementController;
pub use errors::ControllerError;
pub use eval::{Evaluate, RubricEvaluator, ScoreReport};
pub use generation::{ClaudeGenerator, GenerationPort};
pub use history::{HistoryStore, InMemoryHistory, JsonFileHistory};
pub use models::{Artifact, BatchJob, BatchReport, Request, TaskType};
pub use scheduler::{cancel_channel, BatchScheduler, CancelHandle};
