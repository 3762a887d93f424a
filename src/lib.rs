//! Dense square GEMM under several execution strategies, plus a timing harness.
//!
//! Sequential kernels live in [`kernels`], the shared-memory and
//! message-passing engines in [`parallel`], and [`bench`] ties them together:
//! it generates seeded operands, runs one strategy, and produces a
//! [`TimingRecord`].
//!
//! ```
//! use matbench::{generate_operands, Kernel, BlockSize};
//!
//! let (a, b) = generate_operands(8, 42);
//! let naive = Kernel::Naive.multiply(&a, &b);
//! let blocked = Kernel::Blocked(BlockSize::new(3).unwrap()).multiply(&a, &b);
//! assert!(naive.max_abs_diff(&blocked) < 1e-9);
//! ```

pub mod bench;
pub mod error;
pub mod kernels;
pub mod matrix;
pub mod parallel;
pub mod partition;

pub use bench::{generate_operands, run, BenchConfig, BenchOutcome, Strategy, TimingRecord};
pub use error::{MatbenchError, Result};
pub use kernels::{BlockSize, Kernel};
pub use matrix::Matrix;
pub use parallel::{EngineRun, ParallelEngine};
pub use partition::{partition, WorkAssignment};

/// Tile side used by the blocked kernel when none (or an invalid one) is given.
pub const DEFAULT_BLOCK_SIZE: usize = 2;

/// Seed for operand generation when the caller does not pick one.
pub const DEFAULT_SEED: u64 = 42;

/// Rank that owns the operands and receives reductions.
pub const ROOT_RANK: usize = 0;
