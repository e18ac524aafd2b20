pub mod artifact;
pub mod batch;
pub mod request;

pub use artifact::{Artifact, Candidate, TerminationReason};
pub use batch::{BatchJob, BatchReport, Failure, FailureCause, IterationStats};
pub use request::{Request, TaskType};
