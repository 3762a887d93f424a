//! Data-parallel loop over the row assignments on a dedicated rayon pool.
//!
//! The pool is built with exactly as many threads as there are assignments,
//! and every assignment is a single indivisible task, so the work each thread
//! sees matches the static row partition.

use std::time::{Duration, Instant};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::trace;

use crate::error::{check_square, usage_error, Result};
use crate::kernels::matmul_naive_rows;
use crate::partition::{split_rows, WorkAssignment};

use super::catch_worker_panic;

/// Computes `C += A * B` on a rayon pool of `assignments.len()` threads.
///
/// Pool construction happens before the clock starts.
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
    if assignments.is_empty() {
        return Err(usage_error("worker count must be positive"));
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(assignments.len())
        .thread_name(|i| format!("gemm-rayon-{i}"))
        .build()?;
    let blocks = split_rows(c, n, assignments);

    let start = Instant::now();
    pool.install(|| {
        blocks
            .into_par_iter()
            .with_max_len(1)
            .map(|(work, block)| {
                catch_worker_panic(work.worker, || {
                    trace!(
                        worker = work.worker,
                        start = work.start,
                        end = work.end,
                        "task started"
                    );
                    matmul_naive_rows(a, b, block, n, work.rows());
                })
            })
            .collect::<Result<()>>()
    })?;
    Ok(start.elapsed())
}
