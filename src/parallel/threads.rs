//! One scoped OS thread per work assignment.
//!
//! Threads borrow A and B directly and each receives its own `&mut` block of
//! C from [`split_rows`], so nothing is copied and nothing is locked.

use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::error::{check_square, worker_failure, MatbenchError, Result};
use crate::kernels::matmul_naive_rows;
use crate::partition::{split_rows, WorkAssignment};

use super::panic_message;

/// Computes `C += A * B`, one thread per entry of `assignments`.
///
/// Returns the time from the first spawn to the last join. Every thread is
/// joined even if one fails; the first failure is returned.
pub fn multiply(
    a: &[f64],
    b: &[f64],
    c: &mut [f64],
    n: usize,
    assignments: &[WorkAssignment],
) -> Result<Duration> {
    check_square(a, n, "A")?;
    check_square(b, n, "B")?;
    check_square(c, n, "C")?;

    let blocks = split_rows(c, n, assignments);

    let start = Instant::now();
    thread::scope(|s| -> Result<()> {
        let mut handles = Vec::with_capacity(blocks.len());
        let mut first_error: Option<MatbenchError> = None;

        for (work, block) in blocks {
            let spawned = thread::Builder::new()
                .name(format!("gemm-worker-{}", work.worker))
                .spawn_scoped(s, move || {
                    trace!(
                        worker = work.worker,
                        start = work.start,
                        end = work.end,
                        "worker started"
                    );
                    matmul_naive_rows(a, b, block, n, work.rows());
                    trace!(worker = work.worker, "worker finished");
                });
            match spawned {
                Ok(handle) => handles.push((work.worker, handle)),
                Err(e) => {
                    first_error = Some(worker_failure(work.worker, format!("spawn failed: {e}")));
                    break;
                }
            }
        }

        for (worker, handle) in handles {
            if let Err(payload) = handle.join() {
                first_error
                    .get_or_insert_with(|| worker_failure(worker, panic_message(&*payload)));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    })?;
    Ok(start.elapsed())
}
