use matbench::{
    generate_operands, run, BenchConfig, BlockSize, Kernel, MatbenchError, ParallelEngine,
    Strategy, TimingRecord,
};
use std::time::Duration;

#[test]
fn test_operands_are_deterministic() {
    let (a1, b1) = generate_operands(32, 42);
    let (a2, b2) = generate_operands(32, 42);
    assert_eq!(a1, a2);
    assert_eq!(b1, b2);

    let (a3, _) = generate_operands(32, 43);
    assert_ne!(a1, a3);
}

#[test]
fn test_operands_in_unit_interval() {
    let (a, b) = generate_operands(20, 42);
    for &x in a.as_slice().iter().chain(b.as_slice()) {
        assert!((0.0..1.0).contains(&x));
    }
}

#[test]
fn test_runs_are_reproducible_across_strategies() {
    let n = 24;
    let strategies = [
        Strategy::Kernel(Kernel::Naive),
        Strategy::Kernel(Kernel::Reordered),
        Strategy::Kernel(Kernel::Blocked(BlockSize::new(5).unwrap())),
        Strategy::Parallel(ParallelEngine::ThreadPool),
        Strategy::Parallel(ParallelEngine::DataParallelLoop),
        Strategy::Parallel(ParallelEngine::Distributed),
    ];

    let baseline = run(&BenchConfig::new(n, strategies[0])).unwrap();
    let reference = baseline.c.clone().unwrap();

    for strategy in strategies {
        let outcome = run(&BenchConfig::new(n, strategy).with_workers(3)).unwrap();
        assert_eq!(outcome.a, baseline.a, "{}", strategy.name());
        assert_eq!(outcome.b, baseline.b, "{}", strategy.name());
        assert_eq!(outcome.record.strategy, strategy.name());
        assert_eq!(outcome.record.size, n);
        match outcome.c {
            Some(c) => assert!(c.approx_eq(&reference, 1e-9), "{}", strategy.name()),
            None => assert_eq!(strategy, Strategy::Parallel(ParallelEngine::Distributed)),
        }
    }
}

#[test]
fn test_sequential_records_one_worker() {
    let config = BenchConfig::new(8, Strategy::Kernel(Kernel::Reordered)).with_workers(6);
    let outcome = run(&config).unwrap();
    assert_eq!(outcome.record.workers, 1);
    assert_eq!(outcome.assignments.len(), 1);
    assert_eq!(outcome.assignments[0].rows(), 0..8);
}

#[test]
fn test_parallel_records_worker_count() {
    let strategy = Strategy::Parallel(ParallelEngine::ThreadPool);
    let config = BenchConfig::new(10, strategy).with_workers(3);
    let outcome = run(&config).unwrap();
    assert_eq!(outcome.record.workers, 3);
    let ranges: Vec<_> = outcome.assignments.iter().map(|w| w.rows()).collect();
    assert_eq!(ranges, vec![0..3, 3..6, 6..10]);
}

#[test]
fn test_missing_strategy_is_usage_error() {
    let mut config = BenchConfig::new(4, Strategy::Kernel(Kernel::Naive));
    config.strategy = None;
    assert!(matches!(run(&config), Err(MatbenchError::Usage { .. })));
}

#[test]
fn test_invalid_counts_are_usage_errors() {
    let zero_size = BenchConfig::new(0, Strategy::Kernel(Kernel::Naive));
    assert!(matches!(zero_size.validate(), Err(MatbenchError::Usage { .. })));

    let threads = Strategy::Parallel(ParallelEngine::ThreadPool);
    let no_workers = BenchConfig::new(4, threads);
    assert!(matches!(no_workers.validate(), Err(MatbenchError::Usage { .. })));

    let zero_workers = BenchConfig::new(4, threads).with_workers(0);
    assert!(matches!(zero_workers.validate(), Err(MatbenchError::Usage { .. })));
}

#[test]
fn test_seed_changes_operands() {
    let strategy = Strategy::Kernel(Kernel::Naive);
    let first = run(&BenchConfig::new(6, strategy).with_seed(1)).unwrap();
    let second = run(&BenchConfig::new(6, strategy).with_seed(2)).unwrap();
    assert_ne!(first.a, second.a);
}

#[test]
fn test_timing_record_format() {
    let record = TimingRecord::new("threads", 100, 4, Duration::from_millis(250));
    assert_eq!(record.to_string(), "threads, 100, 4, 0.25");
    assert_eq!(record.millis(), 250.0);
}
