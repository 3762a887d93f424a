//! Message-passing GEMM.
//!
//! Each rank owns private copies of A, B and C. Only the root starts with real
//! operands; [`run_rank`] broadcasts them, synchronises, computes the rank's
//! own rows of C, synchronises again, and reduces the per-rank compute times
//! to their maximum at the root. C is left distributed: every rank holds only
//! its own rows.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{check_square, process_failure, usage_error, MatbenchError, Result};
use crate::kernels::matmul_naive_rows;
use crate::matrix::Matrix;
use crate::partition::{assignment, WorkAssignment};
use crate::ROOT_RANK;

use super::panic_message;

pub mod comm;
pub mod local;
pub mod tcp;

pub use comm::{Communicator, Message};
pub use local::LocalComm;
pub use tcp::{Coordinator, TcpComm};

/// What one rank ends up with after [`run_rank`].
#[derive(Debug, Clone)]
pub struct RankOutcome {
    pub rank: usize,
    pub assignment: WorkAssignment,
    /// This rank's time between the two barriers.
    pub local_elapsed: Duration,
    /// Slowest rank's time; `Some` on the root only.
    pub slowest: Option<Duration>,
    pub a: Matrix,
    pub b: Matrix,
    /// Full-size buffer in which only this rank's rows are computed.
    pub c: Matrix,
}

/// The per-rank program.
///
/// The root must pass `Some((a, b))`; other ranks pass `None` and receive the
/// operands by broadcast. Every rank of the world must call this with the
/// same `n`.
pub fn run_rank<C: Communicator>(
    comm: &mut C,
    n: usize,
    operands: Option<(Matrix, Matrix)>,
) -> Result<RankOutcome> {
    let rank = comm.rank();
    let size = comm.size();
    if size == 0 || rank >= size {
        return Err(usage_error(format!("rank {rank} outside a world of {size}")));
    }

    let (mut a, mut b) = match operands {
        Some((a, b)) if comm.is_root() => {
            check_square(a.as_slice(), n, "A")?;
            check_square(b.as_slice(), n, "B")?;
            (a, b)
        }
        None if !comm.is_root() => (Matrix::zeros(n), Matrix::zeros(n)),
        Some(_) => return Err(usage_error(format!("only rank {ROOT_RANK} may supply operands"))),
        None => return Err(usage_error(format!("rank {ROOT_RANK} must supply operands"))),
    };

    comm.broadcast(a.as_mut_slice())?;
    comm.broadcast(b.as_mut_slice())?;
    trace!(rank, "operands received");

    let work = assignment(n, rank, size);
    let mut c = Matrix::zeros(n);

    comm.barrier()?;
    let start = Instant::now();
    matmul_naive_rows(
        a.as_slice(),
        b.as_slice(),
        &mut c.as_mut_slice()[work.start * n..work.end * n],
        n,
        work.rows(),
    );
    comm.barrier()?;
    let local_elapsed = start.elapsed();

    let slowest = comm
        .reduce_max(local_elapsed.as_secs_f64())?
        .map(Duration::from_secs_f64);
    debug!(rank, start = work.start, end = work.end, ?local_elapsed, "rank finished");

    Ok(RankOutcome {
        rank,
        assignment: work,
        local_elapsed,
        slowest,
        a,
        b,
        c,
    })
}

/// Runs a world of `size` ranks as threads of this process and returns the
/// root's outcome.
///
/// The root starts with clones of `a` and `b`; the other ranks start empty.
/// Every rank is joined before returning, and the first failure wins.
pub fn run_local(a: &Matrix, b: &Matrix, size: usize) -> Result<RankOutcome> {
    if size == 0 {
        return Err(usage_error("world size must be positive"));
    }
    let n = a.dim();
    let comms = local::world(size);

    thread::scope(|s| {
        let mut handles = Vec::with_capacity(size);
        let mut first_error: Option<MatbenchError> = None;

        for mut comm in comms {
            let rank = comm.rank();
            let operands = (rank == ROOT_RANK).then(|| (a.clone(), b.clone()));
            let spawned = thread::Builder::new()
                .name(format!("gemm-rank-{rank}"))
                .spawn_scoped(s, move || run_rank(&mut comm, n, operands));
            match spawned {
                Ok(handle) => handles.push((rank, handle)),
                Err(e) => {
                    first_error = Some(process_failure(rank, format!("spawn failed: {e}")));
                    break;
                }
            }
        }

        let mut root = None;
        for (rank, handle) in handles {
            match handle.join() {
                Ok(Ok(outcome)) if rank == ROOT_RANK => root = Some(outcome),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(payload) => {
                    first_error
                        .get_or_insert_with(|| process_failure(rank, panic_message(&*payload)));
                }
            }
        }

        match (first_error, root) {
            (Some(e), _) => Err(e),
            (None, Some(root)) => Ok(root),
            (None, None) => Err(process_failure(ROOT_RANK, "root produced no outcome")),
        }
    })
}
