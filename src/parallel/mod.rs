//! Parallel GEMM engines.
//!
//! Every engine splits the rows of C with [`partition`](crate::partition::partition)
//! and runs the naive kernel on each worker's rows. A and B are shared
//! read-only; each worker writes a disjoint block of C, so no locks are taken.
//!
//! - [`ParallelEngine::ThreadPool`]: one OS thread per assignment ([`threads`]).
//! - [`ParallelEngine::DataParallelLoop`]: a dedicated rayon pool of exactly
//!   `workers` threads ([`data_parallel`]).
//! - [`ParallelEngine::Distributed`]: ranks that share nothing and exchange
//!   messages ([`distributed`]).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{check_square, usage_error, worker_failure, Result};
use crate::matrix::Matrix;
use crate::partition::{partition, WorkAssignment};

pub mod data_parallel;
pub mod distributed;
pub mod threads;

/// Result of one engine invocation.
#[derive(Debug, Clone)]
pub struct EngineRun {
    /// The product, when the engine leaves it in one place. The distributed
    /// engine does not gather C, so it returns `None`.
    pub c: Option<Matrix>,
    /// Row ranges handed to the workers, in worker order.
    pub assignments: Vec<WorkAssignment>,
    /// Wall-clock time of the compute phase. For the distributed engine this
    /// is the slowest rank's time.
    pub elapsed: Duration,
}

/// The available parallel execution substrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelEngine {
    ThreadPool,
    DataParallelLoop,
    Distributed,
}

impl ParallelEngine {
    /// Strategy name used in timing records.
    pub fn name(&self) -> &'static str {
        match self {
            ParallelEngine::ThreadPool => "threads",
            ParallelEngine::DataParallelLoop => "rayon",
            ParallelEngine::Distributed => "mpi",
        }
    }

    /// Computes `A * B` with `workers` workers and blocks until all of them finish.
    ///
    /// The distributed variant runs an in-process world whose ranks are
    /// threads that communicate only through channels; see
    /// [`distributed::tcp`] for ranks in separate processes.
    pub fn run(&self, a: &Matrix, b: &Matrix, workers: usize) -> Result<EngineRun> {
        let n = a.dim();
        check_square(b.as_slice(), n, "B")?;
        if workers == 0 {
            return Err(usage_error("worker count must be positive"));
        }
        if workers > n && n > 0 {
            warn!(n, workers, "more workers than rows, some workers get no rows");
        }

        let assignments = partition(n, workers);
        debug!(engine = self.name(), n, workers, "dispatching");

        match self {
            ParallelEngine::ThreadPool => {
                let mut c = Matrix::zeros(n);
                let elapsed = threads::multiply(
                    a.as_slice(),
                    b.as_slice(),
                    c.as_mut_slice(),
                    n,
                    &assignments,
                )?;
                Ok(EngineRun {
                    c: Some(c),
                    assignments,
                    elapsed,
                })
            }
            ParallelEngine::DataParallelLoop => {
                let mut c = Matrix::zeros(n);
                let elapsed = data_parallel::multiply(
                    a.as_slice(),
                    b.as_slice(),
                    c.as_mut_slice(),
                    n,
                    &assignments,
                )?;
                Ok(EngineRun {
                    c: Some(c),
                    assignments,
                    elapsed,
                })
            }
            ParallelEngine::Distributed => {
                let root = distributed::run_local(a, b, workers)?;
                Ok(EngineRun {
                    c: None,
                    assignments,
                    elapsed: root.slowest.unwrap_or(root.local_elapsed),
                })
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Runs `task` for `worker`, turning a panic into
/// [`MatbenchError::WorkerFailure`](crate::MatbenchError::WorkerFailure).
pub(crate) fn catch_worker_panic<F: FnOnce()>(worker: usize, task: F) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(task))
        .map_err(|payload| worker_failure(worker, panic_message(&*payload)))
}
