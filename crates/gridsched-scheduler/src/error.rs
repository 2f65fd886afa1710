//! Scheduler error types.

use thiserror::Error;

/// Errors surfaced while evaluating a job.
///
/// Nothing in the evaluation core is fatal on its own; the worker driving
/// the evaluation decides whether to retry or fail it.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("state store error: {0}")]
    State(#[from] gridsched_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
