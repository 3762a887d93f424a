//! Benchmark harness: seeded operands, one strategy, one timing record.

use std::fmt;
use std::time::{Duration, Instant};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::info;

use crate::error::{usage_error, Result};
use crate::kernels::Kernel;
use crate::matrix::Matrix;
use crate::parallel::ParallelEngine;
use crate::partition::{assignment, WorkAssignment};
use crate::DEFAULT_SEED;

/// Generates A and B for an `n x n` run.
///
/// Both are filled from a single `StdRng` seeded with `seed`, alternating
/// between them (`a[0], b[0], a[1], b[1], ...`), with values uniform in
/// `[0, 1)`. The same `(n, seed)` always yields bit-identical matrices.
pub fn generate_operands(n: usize, seed: u64) -> (Matrix, Matrix) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut a = Matrix::zeros(n);
    let mut b = Matrix::zeros(n);
    for (x, y) in a.as_mut_slice().iter_mut().zip(b.as_mut_slice().iter_mut()) {
        *x = rng.random::<f64>();
        *y = rng.random::<f64>();
    }
    (a, b)
}

/// What to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Kernel(Kernel),
    Parallel(ParallelEngine),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Kernel(kernel) => kernel.name(),
            Strategy::Parallel(engine) => engine.name(),
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Strategy::Parallel(_))
    }
}

/// Everything one harness run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    /// Matrix dimension `N`.
    pub size: usize,
    /// `None` is a usage error: nothing is computed.
    pub strategy: Option<Strategy>,
    /// Worker, thread or rank count. Required by parallel strategies, ignored
    /// by sequential kernels.
    pub workers: Option<usize>,
    pub seed: u64,
    /// Print A, B and C after the run.
    pub emit_matrices: bool,
    /// Print the elapsed time in milliseconds.
    pub emit_time: bool,
}

impl BenchConfig {
    pub fn new(size: usize, strategy: Strategy) -> Self {
        BenchConfig {
            size,
            strategy: Some(strategy),
            workers: None,
            seed: DEFAULT_SEED,
            emit_matrices: false,
            emit_time: false,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks the configuration and resolves the strategy and worker count.
    pub fn validate(&self) -> Result<(Strategy, usize)> {
        let strategy = self
            .strategy
            .ok_or_else(|| usage_error("no strategy selected"))?;
        if self.size == 0 {
            return Err(usage_error("matrix size must be a positive integer"));
        }
        let workers = match (strategy.is_parallel(), self.workers) {
            (true, Some(0)) => return Err(usage_error("worker count must be a positive integer")),
            (true, Some(p)) => p,
            (true, None) => {
                return Err(usage_error(format!(
                    "strategy '{}' needs a worker count",
                    strategy.name()
                )))
            }
            (false, _) => 1,
        };
        Ok((strategy, workers))
    }
}

/// `(strategy, N, workers, elapsed)` of one completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingRecord {
    pub strategy: &'static str,
    pub size: usize,
    pub workers: usize,
    pub elapsed: Duration,
}

impl TimingRecord {
    pub fn new(strategy: &'static str, size: usize, workers: usize, elapsed: Duration) -> Self {
        TimingRecord {
            strategy,
            size,
            workers,
            elapsed,
        }
    }

    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    pub fn millis(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1e3
    }
}

/// `<strategy>, <N>, <workers>, <seconds>`
impl fmt::Display for TimingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}",
            self.strategy,
            self.size,
            self.workers,
            self.seconds()
        )
    }
}

/// Outputs of [`run`].
#[derive(Debug, Clone)]
pub struct BenchOutcome {
    pub record: TimingRecord,
    pub a: Matrix,
    pub b: Matrix,
    /// `None` for the distributed engine, which does not gather C.
    pub c: Option<Matrix>,
    pub assignments: Vec<WorkAssignment>,
}

/// Runs one benchmark as described by `config`.
///
/// Only the multiplication itself is timed; operand generation and result
/// allocation are not.
pub fn run(config: &BenchConfig) -> Result<BenchOutcome> {
    let (strategy, workers) = config.validate()?;
    let n = config.size;
    let (a, b) = generate_operands(n, config.seed);

    let (c, assignments, elapsed) = match strategy {
        Strategy::Kernel(kernel) => {
            let mut c = Matrix::zeros(n);
            let start = Instant::now();
            kernel.apply(&a, &b, &mut c);
            (Some(c), vec![assignment(n, 0, 1)], start.elapsed())
        }
        Strategy::Parallel(engine) => {
            let run = engine.run(&a, &b, workers)?;
            (run.c, run.assignments, run.elapsed)
        }
    };

    let record = TimingRecord::new(strategy.name(), n, workers, elapsed);
    info!(
        strategy = record.strategy,
        n,
        workers,
        seconds = record.seconds(),
        "run complete"
    );

    Ok(BenchOutcome {
        record,
        a,
        b,
        c,
        assignments,
    })
}
