//! Square row-major matrix storage.
//!
//! A [`Matrix`] is nothing more than `n * n` doubles laid out row by row:
//! element `(i, j)` lives at `data[i * n + j]`. Kernels and engines work on
//! the raw slices; the type only carries the dimension alongside them.

use std::fmt;

use rand::Rng;

use crate::error::{check_square, Result};

/// An `n x n` matrix of `f64` in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Creates an `n x n` matrix filled with zeros.
    pub fn zeros(n: usize) -> Self {
        Matrix {
            n,
            data: vec![0.0; n * n],
        }
    }

    /// Wraps an existing row-major buffer.
    ///
    /// Fails with [`MatbenchError::DimensionMismatch`](crate::MatbenchError::DimensionMismatch)
    /// when `data.len() != n * n`.
    pub fn from_vec(n: usize, data: Vec<f64>) -> Result<Self> {
        check_square(&data, n, "matrix")?;
        Ok(Matrix { n, data })
    }

    /// Creates an `n x n` matrix whose elements are drawn uniformly from `[0, 1)`.
    pub fn random<R: Rng>(n: usize, rng: &mut R) -> Self {
        let data = (0..n * n).map(|_| rng.random::<f64>()).collect();
        Matrix { n, data }
    }

    /// Dimension `n` of the matrix.
    #[inline]
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Element at row `i`, column `j`.
    ///
    /// # Panics
    ///
    /// Panics if `i` or `j` is out of range.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.n && j < self.n, "({i}, {j}) out of range for {0}x{0}", self.n);
        self.data[i * self.n + j]
    }

    /// Row `i` as a slice.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Largest absolute element-wise difference between two matrices of the same dimension.
    ///
    /// # Panics
    ///
    /// Panics if the dimensions differ.
    pub fn max_abs_diff(&self, other: &Matrix) -> f64 {
        assert_eq!(self.n, other.n, "dimension mismatch");
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    /// Returns `true` when every element agrees within `rel_tol` relative to the
    /// larger magnitude (absolute below 1.0).
    pub fn approx_eq(&self, other: &Matrix, rel_tol: f64) -> bool {
        self.n == other.n
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(x, y)| (x - y).abs() <= rel_tol * x.abs().max(y.abs()).max(1.0))
    }
}

/// Fixed-width dump, one matrix row per line.
impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.n {
            for value in self.row(i) {
                write!(f, "{value:>10.6} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
