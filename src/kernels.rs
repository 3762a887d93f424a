//! Single-threaded GEMM kernels for square row-major matrices.
//!
//! All kernels accumulate into `c` (`C += A * B`), so callers pass a zeroed
//! output buffer to obtain `C = A * B`. None of them reads `c` as an operand.
//!
//! - [`matmul_naive`]: textbook `i-j-k` order, the correctness baseline.
//! - [`matmul_reordered`]: `i-k-j` order, B and C walked with stride 1.
//! - [`matmul_blocked`]: cubic tiles of side [`BlockSize`], one store per tile cell.

use std::cmp::min;
use std::fmt;
use std::num::NonZeroUsize;
use std::ops::Range;

use tracing::debug;

use crate::matrix::Matrix;
use crate::DEFAULT_BLOCK_SIZE;

/// Naive matrix multiplication using `i-j-k` loop order.
///
/// The innermost loop walks B down a column (stride `n`), which misses cache
/// on nearly every access for large `n`. Use it as the reference result.
///
/// # Arguments
///
/// * `a` - Matrix A (n × n), row-major
/// * `b` - Matrix B (n × n), row-major
/// * `c` - Matrix C (n × n), row-major, accumulated into (C += A * B)
/// * `n` - Matrix dimension
///
/// # Panics
///
/// Panics if any slice does not hold `n * n` elements.
pub fn matmul_naive(a: &[f64], b: &[f64], c: &mut [f64], n: usize) {
    assert_eq!(c.len(), n * n, "C: expected {}x{}={} elements", n, n, n * n);
    matmul_naive_rows(a, b, c, n, 0..n);
}

/// [`matmul_naive`] restricted to the rows `rows` of C.
///
/// `c_rows` holds only those rows (`rows.len() * n` elements), so workers can
/// each own a disjoint block of C. Row `i` of the full result is stored at
/// `c_rows[(i - rows.start) * n..]`.
///
/// # Panics
///
/// Panics if `rows` exceeds `0..n` or `c_rows` has the wrong length.
pub fn matmul_naive_rows(a: &[f64], b: &[f64], c_rows: &mut [f64], n: usize, rows: Range<usize>) {
    assert_eq!(a.len(), n * n, "A: expected {}x{}={} elements", n, n, n * n);
    assert_eq!(b.len(), n * n, "B: expected {}x{}={} elements", n, n, n * n);
    assert!(rows.end <= n, "rows {:?} exceed dimension {}", rows, n);
    assert_eq!(
        c_rows.len(),
        rows.len() * n,
        "C rows {:?}: expected {} elements",
        rows,
        rows.len() * n
    );

    for (local, i) in rows.enumerate() {
        let a_row = &a[i * n..(i + 1) * n];
        let c_row = &mut c_rows[local * n..(local + 1) * n];
        for (j, c_ij) in c_row.iter_mut().enumerate() {
            for (p, &a_ip) in a_row.iter().enumerate() {
                *c_ij += a_ip * b[p * n + j];
            }
        }
    }
}

/// Cache-friendly matrix multiplication using `i-k-j` loop order.
///
/// `A[i,k]` is hoisted out of the inner loop, which then streams through a row
/// of B and a row of C sequentially. The per-element summation order differs
/// from [`matmul_naive`], so compare the two with a tolerance.
///
/// # Panics
///
/// Panics if any slice does not hold `n * n` elements.
pub fn matmul_reordered(a: &[f64], b: &[f64], c: &mut [f64], n: usize) {
    assert_eq!(a.len(), n * n, "A: expected {}x{}={} elements", n, n, n * n);
    assert_eq!(b.len(), n * n, "B: expected {}x{}={} elements", n, n, n * n);
    assert_eq!(c.len(), n * n, "C: expected {}x{}={} elements", n, n, n * n);

    for i in 0..n {
        let c_row = &mut c[i * n..(i + 1) * n];
        for p in 0..n {
            let a_ip = a[i * n + p];
            let b_row = &b[p * n..(p + 1) * n];
            for (c_ij, &b_pj) in c_row.iter_mut().zip(b_row) {
                *c_ij += a_ip * b_pj;
            }
        }
    }
}

/// Cache-blocked matrix multiplication.
///
/// Splits the `i`, `j` and `k` ranges into tiles of side `block`. For each
/// tile triple, every `(i1, j1)` cell sums its partial dot product in a local
/// accumulator and touches C once. Tiles on the right and bottom edges are
/// clipped to `n`, so any block size (including `block > n`) is valid.
///
/// # Panics
///
/// Panics if any slice does not hold `n * n` elements.
pub fn matmul_blocked(a: &[f64], b: &[f64], c: &mut [f64], n: usize, block: BlockSize) {
    assert_eq!(a.len(), n * n, "A: expected {}x{}={} elements", n, n, n * n);
    assert_eq!(b.len(), n * n, "B: expected {}x{}={} elements", n, n, n * n);
    assert_eq!(c.len(), n * n, "C: expected {}x{}={} elements", n, n, n * n);

    let bs = block.get();
    for ii in (0..n).step_by(bs) {
        let i_end = min(ii + bs, n);
        for jj in (0..n).step_by(bs) {
            let j_end = min(jj + bs, n);
            for kk in (0..n).step_by(bs) {
                let k_end = min(kk + bs, n);
                for i1 in ii..i_end {
                    for j1 in jj..j_end {
                        let mut sum = 0.0;
                        for k1 in kk..k_end {
                            sum += a[i1 * n + k1] * b[k1 * n + j1];
                        }
                        c[i1 * n + j1] += sum;
                    }
                }
            }
        }
    }
}

/// Tile side for [`matmul_blocked`]. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockSize(NonZeroUsize);

impl BlockSize {
    /// Returns `None` for zero.
    pub fn new(size: usize) -> Option<Self> {
        NonZeroUsize::new(size).map(BlockSize)
    }

    /// Parses a user-supplied block size, falling back to the default
    /// ([`DEFAULT_BLOCK_SIZE`]) when the value is absent, non-numeric or not positive.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        let parsed = raw
            .and_then(|s| s.trim().parse::<i64>().ok())
            .and_then(|v| usize::try_from(v).ok())
            .and_then(BlockSize::new);
        match parsed {
            Some(block) => block,
            None => {
                debug!(
                    raw = ?raw,
                    default = DEFAULT_BLOCK_SIZE,
                    "invalid block size, using default"
                );
                BlockSize::default()
            }
        }
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        BlockSize(NonZeroUsize::new(DEFAULT_BLOCK_SIZE).unwrap_or(NonZeroUsize::MIN))
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the sequential GEMM variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Naive,
    Reordered,
    Blocked(BlockSize),
}

impl Kernel {
    /// Strategy name used in timing records.
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::Naive => "naive",
            Kernel::Reordered => "reordered",
            Kernel::Blocked(_) => "blocked",
        }
    }

    /// Accumulates `A * B` into `c`.
    ///
    /// # Panics
    ///
    /// Panics if the three matrices do not share one dimension.
    pub fn apply(&self, a: &Matrix, b: &Matrix, c: &mut Matrix) {
        let n = a.dim();
        assert!(b.dim() == n && c.dim() == n, "A, B and C must share one dimension");
        match *self {
            Kernel::Naive => matmul_naive(a.as_slice(), b.as_slice(), c.as_mut_slice(), n),
            Kernel::Reordered => matmul_reordered(a.as_slice(), b.as_slice(), c.as_mut_slice(), n),
            Kernel::Blocked(block) => {
                matmul_blocked(a.as_slice(), b.as_slice(), c.as_mut_slice(), n, block)
            }
        }
    }

    /// Returns `A * B` in a freshly zeroed matrix.
    pub fn multiply(&self, a: &Matrix, b: &Matrix) -> Matrix {
        let mut c = Matrix::zeros(a.dim());
        self.apply(a, b, &mut c);
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_2x2_known_result() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [5.0, 6.0, 7.0, 8.0];
        let expected = [19.0, 22.0, 43.0, 50.0];

        let mut c = [0.0; 4];
        matmul_naive(&a, &b, &mut c, 2);
        assert_eq!(c, expected);

        let mut c = [0.0; 4];
        matmul_reordered(&a, &b, &mut c, 2);
        assert_eq!(c, expected);

        for bs in 1..=3 {
            let mut c = [0.0; 4];
            matmul_blocked(&a, &b, &mut c, 2, BlockSize::new(bs).unwrap());
            assert_eq!(c, expected, "block size {bs}");
        }
    }

    #[test]
    fn test_kernels_accumulate() {
        let a = [1.0, 0.0, 0.0, 1.0];
        let b = [2.0, 3.0, 4.0, 5.0];
        let mut c = [1.0; 4];
        matmul_reordered(&a, &b, &mut c, 2);
        assert_eq!(c, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_naive_rows_writes_only_its_block() {
        let n = 3;
        let a: Vec<f64> = (0..9).map(|x| x as f64).collect();
        let b: Vec<f64> = (0..9).map(|x| (x % 4) as f64).collect();

        let mut full = vec![0.0; 9];
        matmul_naive(&a, &b, &mut full, n);

        let mut middle = vec![0.0; 3];
        matmul_naive_rows(&a, &b, &mut middle, n, 1..2);
        assert_eq!(middle, full[3..6]);
    }

    #[test]
    fn test_zero_dimension() {
        let mut c: [f64; 0] = [];
        matmul_naive(&[], &[], &mut c, 0);
        matmul_reordered(&[], &[], &mut c, 0);
        matmul_blocked(&[], &[], &mut c, 0, BlockSize::default());
    }

    #[test]
    fn test_block_size_parsing() {
        assert_eq!(BlockSize::parse_or_default(Some("8")).get(), 8);
        assert_eq!(BlockSize::parse_or_default(Some("0")).get(), 2);
        assert_eq!(BlockSize::parse_or_default(Some("-4")).get(), 2);
        assert_eq!(BlockSize::parse_or_default(Some("abc")).get(), 2);
        assert_eq!(BlockSize::parse_or_default(Some("")).get(), 2);
        assert_eq!(BlockSize::parse_or_default(None).get(), 2);
        assert!(BlockSize::new(0).is_none());
    }

    #[test]
    fn test_kernel_names() {
        assert_eq!(Kernel::Naive.name(), "naive");
        assert_eq!(Kernel::Reordered.name(), "reordered");
        assert_eq!(Kernel::Blocked(BlockSize::default()).name(), "blocked");
    }
}
