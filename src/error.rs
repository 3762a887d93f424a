//! Error types for matbench operations.
//!
//! Every fallible path in the crate reports one of these variants instead of
//! panicking, so the binary can print usage text or a diagnostic and exit.

use thiserror::Error;

/// Errors that can occur while configuring or running a benchmark.
#[derive(Debug, Error)]
pub enum MatbenchError {
    /// Wrong arguments, missing strategy, or a zero size/worker count.
    #[error("Usage error: {message}")]
    Usage {
        /// Human-readable error message.
        message: String,
    },
    /// A buffer does not hold `n * n` elements.
    #[error("Dimension mismatch: {message} (expected {expected} elements, got {actual})")]
    DimensionMismatch {
        /// Element count implied by the matrix dimension.
        expected: usize,
        /// Element count actually supplied.
        actual: usize,
        /// Human-readable error message.
        message: String,
    },
    /// A shared-memory worker did not complete.
    #[error("Worker {worker} failed: {message}")]
    WorkerFailure {
        /// Index of the failed worker.
        worker: usize,
        /// Human-readable error message.
        message: String,
    },
    /// A distributed rank did not complete.
    #[error("Rank {rank} failed: {message}")]
    ProcessFailure {
        /// Rank of the failed participant.
        rank: usize,
        /// Human-readable error message.
        message: String,
    },
    /// A message could not be delivered, or arrived out of protocol order.
    #[error("Communication error: {message}")]
    Communication {
        /// Human-readable error message.
        message: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result type alias for matbench operations.
pub type Result<T> = std::result::Result<T, MatbenchError>;

/// Creates a usage error.
pub fn usage_error(message: impl Into<String>) -> MatbenchError {
    MatbenchError::Usage {
        message: message.into(),
    }
}

/// Creates a dimension mismatch error.
pub fn dimension_error(
    expected: usize,
    actual: usize,
    message: impl Into<String>,
) -> MatbenchError {
    MatbenchError::DimensionMismatch {
        expected,
        actual,
        message: message.into(),
    }
}

/// Creates a worker failure error.
pub fn worker_failure(worker: usize, message: impl Into<String>) -> MatbenchError {
    MatbenchError::WorkerFailure {
        worker,
        message: message.into(),
    }
}

/// Creates a process failure error.
pub fn process_failure(rank: usize, message: impl Into<String>) -> MatbenchError {
    MatbenchError::ProcessFailure {
        rank,
        message: message.into(),
    }
}

/// Creates a communication error.
pub fn communication_error(message: impl Into<String>) -> MatbenchError {
    MatbenchError::Communication {
        message: message.into(),
    }
}

/// Checks that `data` holds exactly `n * n` elements.
pub(crate) fn check_square(data: &[f64], n: usize, name: &str) -> Result<()> {
    if data.len() != n * n {
        return Err(dimension_error(
            n * n,
            data.len(),
            format!("{name} must be {n}x{n}"),
        ));
    }
    Ok(())
}
