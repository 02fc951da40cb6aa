//! Error types for scheduling and platform probes

use std::path::PathBuf;
use thiserror::Error;

/// Outcome of a task that did not complete successfully.
///
/// The body's own error is carried unchanged in [`TaskError::Failed`];
/// cancellation is never folded into it.
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// The task was removed from the queue before it started.
    #[error("task cancelled")]
    Cancelled,
    /// The task body returned an error.
    #[error("task failed: {0}")]
    Failed(E),
}

impl<E> TaskError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    /// Returns the body's error, if this is a failure
    pub fn into_failure(self) -> Option<E> {
        match self {
            TaskError::Failed(e) => Some(e),
            TaskError::Cancelled => None,
        }
    }
}

/// Errors raised while reading platform telemetry files
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("telemetry source not available: {path}")]
    NotAvailable { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },
}
