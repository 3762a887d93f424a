//! Command-line front end for the GEMM benchmark.
//!
//! # Usage
//!
//! ```bash
//! # Sequential kernels
//! matbench 512 --opt0 -t
//! matbench 512 --opt1 -t
//! matbench 512 --opt2=32 -t
//!
//! # Parallel engines with 4 workers
//! matbench 1024 4 --threads -t
//! matbench 1024 4 --rayon -t
//! matbench 1024 4 --mpi -t
//! matbench 1024 4 --mpi --transport process -t
//!
//! # Dump the matrices of a small run
//! matbench 4 --opt2 -o
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `warn`).

use std::net::SocketAddr;
use std::path::Path;
use std::process::{Child, Command, ExitCode};

use anyhow::{bail, Context, Result};
use clap::{Args, CommandFactory, Parser, ValueEnum};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use matbench::error::process_failure;
use matbench::parallel::distributed::{run_rank, Coordinator, RankOutcome, TcpComm};
use matbench::{
    generate_operands, BenchConfig, BlockSize, Kernel, Matrix, MatbenchError, ParallelEngine,
    Strategy, TimingRecord, DEFAULT_SEED,
};

/// Exit code for usage errors (no strategy, bad counts).
const EXIT_USAGE: u8 = 2;

/// Dense square matrix multiplication benchmark
#[derive(Parser, Debug)]
#[command(name = "matbench")]
#[command(about = "Time naive, reordered, blocked and parallel GEMM on random N x N matrices")]
#[command(version)]
struct Cli {
    /// Matrix dimension N
    size: usize,

    /// Worker count for --threads/--rayon, rank count for --mpi
    workers: Option<usize>,

    /// Print matrices A, B and C
    #[arg(short = 'o')]
    output: bool,

    /// Print elapsed compute time in milliseconds, then the CSV timing record
    #[arg(short = 't')]
    timer: bool,

    #[command(flatten)]
    strategy: StrategyArgs,

    /// Seed for the operand generator
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Where --mpi ranks run
    #[arg(long, value_enum, default_value_t = Transport::Local)]
    transport: Transport,

    /// Rank of this process (set by the --mpi process launcher)
    #[arg(long, hide = true, requires = "coordinator")]
    rank: Option<usize>,

    /// Address of rank 0 (set by the --mpi process launcher)
    #[arg(long, hide = true, requires = "rank")]
    coordinator: Option<SocketAddr>,
}

#[derive(Args, Debug)]
#[group(multiple = false)]
struct StrategyArgs {
    /// Naive i-j-k kernel
    #[arg(long)]
    opt0: bool,

    /// Loop-reordered i-k-j kernel
    #[arg(long)]
    opt1: bool,

    /// Cache-blocked kernel; block size defaults to 2 when absent or invalid
    #[arg(
        long,
        value_name = "BLOCK_SIZE",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = ""
    )]
    opt2: Option<String>,

    /// One OS thread per worker
    #[arg(long)]
    threads: bool,

    /// Rayon pool with one thread per worker
    #[arg(long)]
    rayon: bool,

    /// Message-passing ranks
    #[arg(long)]
    mpi: bool,
}

impl StrategyArgs {
    fn resolve(&self) -> Option<Strategy> {
        if self.opt0 {
            Some(Strategy::Kernel(Kernel::Naive))
        } else if self.opt1 {
            Some(Strategy::Kernel(Kernel::Reordered))
        } else if let Some(raw) = &self.opt2 {
            Some(Strategy::Kernel(Kernel::Blocked(BlockSize::parse_or_default(
                Some(raw.as_str()),
            ))))
        } else if self.threads {
            Some(Strategy::Parallel(ParallelEngine::ThreadPool))
        } else if self.rayon {
            Some(Strategy::Parallel(ParallelEngine::DataParallelLoop))
        } else if self.mpi {
            Some(Strategy::Parallel(ParallelEngine::Distributed))
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Ranks are threads of this process
    Local,
    /// Ranks are separate processes linked by loopback TCP
    Process,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            print!("{}", e.render());
            print_usage();
            return ExitCode::from(EXIT_USAGE);
        }
        Err(e) => {
            // --help / --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    match dispatch(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<MatbenchError>() {
            Some(MatbenchError::Usage { message }) => {
                println!("{message}");
                print_usage();
                ExitCode::from(EXIT_USAGE)
            }
            _ => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn print_usage() {
    println!("{}", Cli::command().render_help());
}

fn dispatch(cli: &Cli) -> Result<()> {
    let config = BenchConfig {
        size: cli.size,
        strategy: cli.strategy.resolve(),
        workers: cli.workers,
        seed: cli.seed,
        emit_matrices: cli.output,
        emit_time: cli.timer,
    };

    if let (Some(rank), Some(addr)) = (cli.rank, cli.coordinator) {
        return run_worker_rank(&config, rank, addr);
    }

    let (strategy, workers) = config.validate()?;
    if strategy == Strategy::Parallel(ParallelEngine::Distributed)
        && cli.transport == Transport::Process
    {
        return run_root_rank(&config, workers);
    }

    let outcome = matbench::run(&config)?;
    report(&config, &outcome.record, &outcome.a, &outcome.b, outcome.c.as_ref());
    Ok(())
}

fn report(
    config: &BenchConfig,
    record: &TimingRecord,
    a: &Matrix,
    b: &Matrix,
    c: Option<&Matrix>,
) {
    if config.emit_time {
        println!("{} ms", record.millis());
        println!("{record}");
    }

    if config.emit_matrices {
        println!("Matrix A:");
        print!("{a}");
        println!("Matrix B:");
        print!("{b}");
        match c {
            Some(c) => {
                println!("Matrix C = A * B:");
                print!("{c}");
            }
            None => warn!("C is not gathered by the distributed engine, skipping its dump"),
        }
    }
}

/// Rank 0 of a multi-process world: spawns the other ranks, runs its share,
/// and reports the slowest rank's time.
fn run_root_rank(config: &BenchConfig, size: usize) -> Result<()> {
    let n = config.size;
    let coordinator = Coordinator::bind().context("failed to bind coordinator socket")?;
    let addr = coordinator.local_addr()?;
    let exe = std::env::current_exe().context("failed to locate own executable")?;

    let mut children: Vec<(usize, Child)> = Vec::with_capacity(size.saturating_sub(1));
    let outcome = match spawn_and_run(config, size, &exe, coordinator, addr, &mut children) {
        Ok(outcome) => outcome,
        Err(e) => {
            abort_ranks(&mut children);
            return Err(e);
        }
    };

    let mut failure = None;
    for (rank, mut child) in children {
        match child.wait() {
            Ok(status) if status.success() => {}
            Ok(status) => {
                failure.get_or_insert_with(|| {
                    anyhow::Error::from(process_failure(rank, format!("exited with {status}")))
                });
            }
            Err(e) => {
                failure.get_or_insert_with(|| {
                    anyhow::Error::new(e).context(format!("failed to wait for rank {rank}"))
                });
            }
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }

    let elapsed = outcome.slowest.unwrap_or(outcome.local_elapsed);
    let record = TimingRecord::new(ParallelEngine::Distributed.name(), n, size, elapsed);
    report(config, &record, &outcome.a, &outcome.b, None);
    Ok(())
}

/// Spawns ranks `1..size` into `children`, then runs rank 0.
fn spawn_and_run(
    config: &BenchConfig,
    size: usize,
    exe: &Path,
    coordinator: Coordinator,
    addr: SocketAddr,
    children: &mut Vec<(usize, Child)>,
) -> Result<RankOutcome> {
    let n = config.size;
    for rank in 1..size {
        let child = Command::new(exe)
            .arg(n.to_string())
            .arg(size.to_string())
            .arg("--mpi")
            .arg("--transport=process")
            .arg(format!("--seed={}", config.seed))
            .arg(format!("--rank={rank}"))
            .arg(format!("--coordinator={addr}"))
            .spawn()
            .with_context(|| format!("failed to spawn rank {rank}"))?;
        children.push((rank, child));
    }

    let mut comm = coordinator.accept(size)?;
    let (a, b) = generate_operands(n, config.seed);
    Ok(run_rank(&mut comm, n, Some((a, b)))?)
}

/// Kills and reaps every spawned rank.
fn abort_ranks(children: &mut [(usize, Child)]) {
    for (rank, child) in children.iter_mut() {
        if let Err(e) = child.kill() {
            debug!(rank = *rank, "kill failed: {e}");
        }
        if let Err(e) = child.wait() {
            warn!(rank = *rank, "failed to reap rank: {e}");
        }
    }
}

/// A non-root rank of a multi-process world. Prints nothing on success.
fn run_worker_rank(config: &BenchConfig, rank: usize, addr: SocketAddr) -> Result<()> {
    let Some(size) = config.workers else {
        bail!("rank {rank} started without a world size");
    };
    let mut comm = TcpComm::connect(addr, rank, size)
        .with_context(|| format!("rank {rank} failed to reach {addr}"))?;
    run_rank(&mut comm, config.size, None)?;
    Ok(())
}
