//! Row partitioning for parallel workers.
//!
//! Worker `idx` of `p` gets the half-open row range
//! `[idx * (n / p), idx * (n / p) + n / p)`, except the last worker whose range
//! always ends at `n` and so absorbs the `n % p` remainder rows. The split is
//! deliberately not balanced: with `n = 10, p = 3` the ranges are
//! `[0,3) [3,6) [6,10)`.

use std::ops::Range;

use tracing::debug;

/// The contiguous rows of C owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkAssignment {
    /// Worker index (thread id or rank).
    pub worker: usize,
    /// First row, inclusive.
    pub start: usize,
    /// Last row, exclusive.
    pub end: usize,
}

impl WorkAssignment {
    #[inline]
    pub fn rows(&self) -> Range<usize> {
        self.start..self.end
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Row range of worker `idx` among `workers` for an `n x n` problem.
///
/// # Panics
///
/// Panics if `workers == 0` or `idx >= workers`.
pub fn assignment(n: usize, idx: usize, workers: usize) -> WorkAssignment {
    assert!(workers > 0, "worker count must be positive");
    assert!(idx < workers, "worker index {} out of range for {} workers", idx, workers);

    let per = n / workers;
    let start = idx * per;
    let end = if idx == workers - 1 { n } else { start + per };
    WorkAssignment {
        worker: idx,
        start,
        end,
    }
}

/// All `workers` assignments for an `n x n` problem, in worker order.
///
/// The ranges cover `[0, n)` exactly once. When `workers > n` every worker but
/// the last gets an empty range.
///
/// # Panics
///
/// Panics if `workers == 0`.
pub fn partition(n: usize, workers: usize) -> Vec<WorkAssignment> {
    assert!(workers > 0, "worker count must be positive");
    let assignments: Vec<_> = (0..workers).map(|idx| assignment(n, idx, workers)).collect();
    debug!(n, workers, per = n / workers, "partitioned rows");
    assignments
}

/// Splits the row-major buffer `c` of an `n x n` matrix into one disjoint
/// mutable block per assignment.
///
/// # Panics
///
/// Panics if `c.len() != n * n` or the assignments are not the consecutive
/// ranges produced by [`partition`].
pub fn split_rows<'a>(
    c: &'a mut [f64],
    n: usize,
    assignments: &[WorkAssignment],
) -> Vec<(WorkAssignment, &'a mut [f64])> {
    assert_eq!(c.len(), n * n, "C: expected {}x{}={} elements", n, n, n * n);

    let mut blocks = Vec::with_capacity(assignments.len());
    let mut rest = c;
    let mut next_row = 0;
    for &work in assignments {
        assert_eq!(work.start, next_row, "assignments must be consecutive");
        let (block, tail) = rest.split_at_mut(work.len() * n);
        blocks.push((work, block));
        rest = tail;
        next_row = work.end;
    }
    assert!(rest.is_empty(), "assignments must cover every row");
    blocks
}
