use std::thread;

use matbench::parallel::distributed::{
    local, run_local, run_rank, Communicator, Coordinator, Message, RankOutcome, TcpComm,
};
use matbench::{generate_operands, Kernel, MatbenchError, Matrix, ParallelEngine};

/// Rebuilds C from every rank's own rows.
fn assemble(n: usize, outcomes: &[RankOutcome]) -> Matrix {
    let mut c = Matrix::zeros(n);
    for outcome in outcomes {
        let rows = outcome.assignment.start * n..outcome.assignment.end * n;
        c.as_mut_slice()[rows.clone()].copy_from_slice(&outcome.c.as_slice()[rows]);
    }
    c
}

fn run_local_world(a: &Matrix, b: &Matrix, size: usize) -> Vec<RankOutcome> {
    let n = a.dim();
    let comms = local::world(size);
    thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|mut comm| {
                let operands = comm.is_root().then(|| (a.clone(), b.clone()));
                s.spawn(move || run_rank(&mut comm, n, operands).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn test_size_one_world_is_identical_to_naive() {
    let (a, b) = generate_operands(12, 42);
    let naive = Kernel::Naive.multiply(&a, &b);

    let root = run_local(&a, &b, 1).unwrap();
    assert_eq!(root.rank, 0);
    assert_eq!(root.c, naive);
    assert!(root.slowest.is_some());
}

#[test]
fn test_ranks_compute_their_rows_of_the_product() {
    for (n, size) in [(10, 3), (16, 4), (5, 5), (3, 6)] {
        let (a, b) = generate_operands(n, 11);
        let naive = Kernel::Naive.multiply(&a, &b);

        let outcomes = run_local_world(&a, &b, size);
        assert_eq!(outcomes.len(), size);
        for outcome in &outcomes {
            // broadcast delivered identical operands everywhere
            assert_eq!(outcome.a, a);
            assert_eq!(outcome.b, b);
            assert_eq!(outcome.slowest.is_some(), outcome.rank == 0);
        }
        assert_eq!(assemble(n, &outcomes), naive, "n={} size={}", n, size);
    }
}

#[test]
fn test_root_reports_slowest_rank() {
    let (a, b) = generate_operands(20, 5);
    let outcomes = run_local_world(&a, &b, 4);
    let slowest = outcomes[0].slowest.unwrap().as_secs_f64();
    for outcome in &outcomes {
        assert!(outcome.local_elapsed.as_secs_f64() <= slowest + 1e-9);
    }
}

#[test]
fn test_engine_leaves_c_distributed() {
    let (a, b) = generate_operands(8, 1);
    let run = ParallelEngine::Distributed.run(&a, &b, 3).unwrap();
    assert!(run.c.is_none());
    let ranges: Vec<_> = run.assignments.iter().map(|w| w.rows()).collect();
    assert_eq!(ranges, vec![0..2, 2..4, 4..8]);
}

#[test]
fn test_collectives() {
    let comms = local::world(3);
    thread::scope(|s| {
        for mut comm in comms {
            s.spawn(move || {
                let mut buf = if comm.is_root() {
                    vec![1.0, 2.0, 3.0]
                } else {
                    vec![0.0; 3]
                };
                comm.broadcast(&mut buf).unwrap();
                assert_eq!(buf, vec![1.0, 2.0, 3.0]);

                comm.barrier().unwrap();

                let max = comm.reduce_max(comm.rank() as f64 * 1.5).unwrap();
                if comm.is_root() {
                    assert_eq!(max, Some(3.0));
                } else {
                    assert_eq!(max, None);
                }
            });
        }
    });
}

#[test]
fn test_out_of_order_message_is_communication_error() {
    let mut comms = local::world(2);
    let mut worker = comms.pop().unwrap();
    let mut root = comms.pop().unwrap();

    worker.send(0, &Message::Elapsed(1.0)).unwrap();
    assert!(matches!(root.barrier(), Err(MatbenchError::Communication { .. })));
}

#[test]
fn test_broadcast_length_mismatch() {
    let mut comms = local::world(2);
    let mut worker = comms.pop().unwrap();
    let mut root = comms.pop().unwrap();

    root.broadcast(&mut [1.0, 2.0]).unwrap();
    let mut short = [0.0; 1];
    assert!(matches!(
        worker.broadcast(&mut short),
        Err(MatbenchError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_vanished_rank_fails_the_run() {
    let mut comms = local::world(2);
    drop(comms.pop());
    let mut root = comms.pop().unwrap();

    let (a, b) = generate_operands(4, 42);
    assert!(matches!(
        run_rank(&mut root, 4, Some((a, b))),
        Err(MatbenchError::Communication { .. })
    ));
}

#[test]
fn test_operands_only_from_root() {
    let mut comms = local::world(2);
    let mut worker = comms.pop().unwrap();
    let (a, b) = generate_operands(4, 42);
    assert!(matches!(
        run_rank(&mut worker, 4, Some((a, b))),
        Err(MatbenchError::Usage { .. })
    ));
}

#[test]
fn test_tcp_world_over_loopback() {
    let n = 9;
    let size = 3;
    let (a, b) = generate_operands(n, 42);
    let naive = Kernel::Naive.multiply(&a, &b);

    let coordinator = Coordinator::bind().unwrap();
    let addr = coordinator.local_addr().unwrap();

    let workers: Vec<_> = (1..size)
        .map(|rank| {
            thread::spawn(move || {
                let mut comm = TcpComm::connect(addr, rank, size).unwrap();
                run_rank(&mut comm, n, None).unwrap()
            })
        })
        .collect();

    let mut root_comm = coordinator.accept(size).unwrap();
    let root = run_rank(&mut root_comm, n, Some((a.clone(), b.clone()))).unwrap();

    let mut outcomes = vec![root];
    outcomes.extend(workers.into_iter().map(|h| h.join().unwrap()));
    for outcome in &outcomes {
        assert_eq!(outcome.a, a);
        assert_eq!(outcome.b, b);
    }
    assert!(outcomes[0].slowest.is_some());
    assert_eq!(assemble(n, &outcomes), naive);
}

#[test]
fn test_tcp_rejects_invalid_rank() {
    let coordinator = Coordinator::bind().unwrap();
    let addr = coordinator.local_addr().unwrap();
    assert!(TcpComm::connect(addr, 0, 2).is_err());
    assert!(TcpComm::connect(addr, 2, 2).is_err());
}
