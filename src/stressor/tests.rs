use std::{sync::Arc, time::Duration};

use crate::{backend::{Backend, MemoryBackend}, config::{BackendConfig, BankConfig, BankWeights, KeyspaceConfig, MemoryBackendConfig, StressorConfig, SyntheticConfig}, keygen::KeySpacePartitioner, workload::{BankContext, BankWorkloadFactory, SyntheticWorkloadFactory, TransactionShape, TransactionWorkload}};

use super::*;

fn keyspace(num_keys: u64) -> KeyspaceConfig {
    KeyspaceConfig {
        num_keys,
        value_size: 16,
        ..Default::default()
    }
}

fn stressor_config(threads: usize, millis: u64) -> StressorConfig {
    StressorConfig {
        num_threads: threads,
        simulation_time_ms: millis,
        seed: Some(42),
        ..Default::default()
    }
}

fn synthetic() -> Arc<SyntheticWorkloadFactory> {
    Arc::new(SyntheticWorkloadFactory::new(&SyntheticConfig::default()).unwrap())
}

fn count(report: &Report, key: &str) -> u64 {
    report.get(key).unwrap_or_else(|| panic!("Missing {}", key)).parse().unwrap()
}

#[test]
fn test_zero_simulation_time() {
    let backend = MemoryBackend::new();
    let stressor = Stressor::new(0, 1, &keyspace(100), &stressor_config(4, 0), synthetic()).unwrap();
    let report = stressor.stress(&backend).unwrap();

    for key in [READ_ONLY_TX_COUNT, WRITE_TX_COUNT, READ_ONLY_TX_EXEC_FAILED, WRITE_TX_EXEC_FAILED,
        READ_ONLY_TX_COMMIT_FAILED, WRITE_TX_COMMIT_FAILED, TOTAL_FAILURES] {
        assert_eq!(count(&report, key), 0, "{}", key);
    }
    for key in [AVG_READ_ONLY_TX_DURATION, AVG_WRITE_TX_DURATION, AVG_WRITE_COMMIT_FAILED_DURATION] {
        assert_eq!(count(&report, key), 0, "{}", key);
    }
    assert_eq!(report.get(THROUGHPUT).unwrap(), "0.00");
    assert_eq!(count(&report, NUM_THREADS), 4);
    assert_eq!(backend.store().len(), 0);
}

#[test]
fn test_stress_counts_every_outcome() {
    let backend = MemoryBackend::new();
    backend.set_up(&BackendConfig::Memory(MemoryBackendConfig {
        exec_failure_pct: 10,
        commit_failure_pct: 30,
        ..Default::default()
    }), 0).unwrap();

    let stressor = Stressor::new(0, 1, &keyspace(1000), &stressor_config(3, 200), synthetic()).unwrap();
    assert_eq!(stressor.state(), StressorState::Idle);
    let report = stressor.stress(&backend).unwrap();
    assert_eq!(stressor.state(), StressorState::ReportReady);

    assert!(count(&report, READ_ONLY_TX_COUNT) > 0);
    assert!(count(&report, WRITE_TX_COUNT) > 0);
    assert!(count(&report, READ_ONLY_TX_EXEC_FAILED) > 0);
    assert!(count(&report, WRITE_TX_EXEC_FAILED) > 0);
    assert!(count(&report, READ_ONLY_TX_COMMIT_FAILED) > 0);
    assert!(count(&report, WRITE_TX_COMMIT_FAILED) > 0);
    assert!(report.get(THROUGHPUT).unwrap().parse::<f64>().unwrap() > 0.0);
    assert!(count(&report, DURATION) >= 150);

    let failures = count(&report, READ_ONLY_TX_EXEC_FAILED) + count(&report, WRITE_TX_EXEC_FAILED)
        + count(&report, READ_ONLY_TX_COMMIT_FAILED) + count(&report, WRITE_TX_COMMIT_FAILED);
    assert_eq!(count(&report, TOTAL_FAILURES), failures);

    // Backend numbers ride along.
    assert_eq!(count(&report, "BACKEND_COMMITS"), count(&report, READ_ONLY_TX_COUNT) + count(&report, WRITE_TX_COUNT));
    assert!(count(&report, "BACKEND_ENTRIES") > 0);

    stressor.destroy(&backend).unwrap();
    assert!(backend.store().is_empty());
    assert_eq!(stressor.state(), StressorState::Idle);
}

#[test]
fn test_merge_is_order_independent() {
    let mut per_thread = Vec::new();
    for t in 0..4u32 {
        let mut stats = ThreadStats::new();
        for i in 0..(10 + t * 3) {
            let mut tx = TransactionWorkload::new(i % 2 == 0, TransactionShape::Synthetic { reads: 1, writes: 0 });
            tx.start_execution();
            tx.end_execution(i % 5 != 0);
            if i % 5 != 0 {
                tx.end_commit(i % 7 != 0);
            }
            stats.record(&tx);
        }
        stats.duration = Duration::from_millis(100 + t as u64);
        per_thread.push(stats);
    }

    let mut forward = ThreadStats::default();
    per_thread.iter().for_each(|s| forward.merge(s));
    let mut backward = ThreadStats::default();
    per_thread.iter().rev().for_each(|s| backward.merge(s));
    let mut paired = ThreadStats::default();
    let mut left = per_thread[0];
    left.merge(&per_thread[2]);
    let mut right = per_thread[3];
    right.merge(&per_thread[1]);
    paired.merge(&right);
    paired.merge(&left);

    assert_eq!(forward, backward);
    assert_eq!(forward, paired);
    assert_eq!(forward.threads, 4);
    assert_eq!(forward.duration, Duration::from_millis(406));
    assert_eq!(forward.report(Default::default()), paired.report(Default::default()));
}

#[test]
fn test_empty_stats_have_zero_averages() {
    let stats = ThreadStats::default();
    assert_eq!(stats.throughput(), 0.0);
    assert_eq!(stats.avg_duration(), Duration::ZERO);
    assert_eq!(stats.read_only.committed.avg_total_time(), Duration::ZERO);
}

#[test]
fn test_bank_stress_keeps_total() {
    let config = BankConfig {
        num_accounts: 10,
        initial_amount: 1000,
        max_amount: 50,
        weights: BankWeights { transfer: 70, deposit: 10, withdraw: 10, check_all_accounts: 10 },
        bucket: String::from("bank"),
    };
    let backend = MemoryBackend::new();
    let ctx = BankContext::new(&config);
    ctx.populate(&backend);

    let factory = Arc::new(BankWorkloadFactory::new(&config).unwrap());
    let stressor = Stressor::new(0, 1, &keyspace(10), &stressor_config(4, 150), factory).unwrap();
    let report = stressor.stress(&backend).unwrap();

    // Serializable backend: every check-all-accounts sees the full total.
    assert_eq!(count(&report, TOTAL_FAILURES), 0);
    assert!(count(&report, READ_ONLY_TX_COUNT) > 0);
    assert!(count(&report, WRITE_TX_COUNT) > 0);

    let mut txn = backend.start_transaction().unwrap();
    assert_eq!(ctx.check_all_accounts(txn.as_mut()).unwrap(), 11000);
    txn.end(false).unwrap();
}

#[test]
fn test_coordinator_sits_out() {
    let backend = MemoryBackend::new();
    assert!(backend.is_coordinator());
    let config = StressorConfig {
        coordinator_participation: false,
        ..stressor_config(2, 50)
    };
    let stressor = Stressor::new(0, 1, &keyspace(100), &config, synthetic()).unwrap();
    let report = stressor.stress(&backend).unwrap();

    assert_eq!(count(&report, READ_ONLY_TX_COUNT) + count(&report, WRITE_TX_COUNT), 0);
    assert_eq!(count(&report, TOTAL_FAILURES), 0);
    assert!(count(&report, DURATION) >= 40);
    assert_eq!(report.get(THROUGHPUT).unwrap(), "0.00");
}

#[test]
fn test_warmup_discards_statistics() {
    let backend = MemoryBackend::new();
    let config = StressorConfig {
        warmup_time_ms: 100,
        ..stressor_config(2, 0)
    };
    let stressor = Stressor::new(0, 1, &keyspace(100), &config, synthetic()).unwrap();
    let report = stressor.stress(&backend).unwrap();

    assert_eq!(count(&report, READ_ONLY_TX_COUNT) + count(&report, WRITE_TX_COUNT), 0);
    // Warmup writes still land in the backend.
    assert!(count(&report, "BACKEND_COMMITS") > 0);
}

#[test]
fn test_set_parameter() {
    let stressor = Stressor::new(0, 2, &keyspace(100), &stressor_config(2, 10), synthetic()).unwrap();

    assert!(stressor.set_parameter("number_of_keys", "500"));
    assert_eq!(stressor.partitioner().num_keys(), 500);
    assert!(!stressor.set_parameter("number_of_keys", "0"));
    assert!(!stressor.set_parameter("number_of_keys", "-5"));
    assert_eq!(stressor.partitioner().num_keys(), 500);

    assert!(stressor.set_parameter("number_of_threads", "3"));
    assert!(!stressor.set_parameter("number_of_nodes", "0"));
    assert_eq!(stressor.partitioner(), KeySpacePartitioner::new(500, 2, 3).unwrap());

    assert!(!stressor.set_parameter("locality_probability", "101"));
    assert!(stressor.set_parameter("locality_probability", "40"));
    assert!(stressor.set_parameter("no_contention", "true"));
    assert!(!stressor.set_parameter("no_contention", "maybe"));
    assert!(!stressor.set_parameter("bucket_prefix", "  "));
    assert!(!stressor.set_parameter("simulation_time", "0"));

    let settings = stressor.settings_snapshot().unwrap();
    assert_eq!(settings.keyspace.locality_probability, 40);
    assert!(settings.keyspace.no_contention);
    assert_eq!(settings.stressor.simulation_time_ms, 10);

    // Falls through to the workload.
    assert!(stressor.set_parameter("write_tx_percentage", "55"));
    assert!(!stressor.set_parameter("write_tx_percentage", "555"));
    assert!(!stressor.set_parameter("not_a_parameter", "1"));
}

#[test]
fn test_adopt_partitioner() {
    let stressor = Stressor::new(1, 3, &keyspace(100), &stressor_config(2, 10), synthetic()).unwrap();
    let p = KeySpacePartitioner::new(777, 2, 5).unwrap();
    stressor.adopt_partitioner(&p).unwrap();
    assert_eq!(stressor.partitioner(), p);
    assert_eq!(stressor.settings_snapshot().unwrap().stressor.num_threads, 5);
}

#[test]
fn test_population_covers_key_space() {
    let store = Arc::new(crate::backend::MemoryStore::new());
    let config = keyspace(103);
    let p = KeySpacePartitioner::new(103, 2, 3).unwrap();

    let mut written = 0;
    for node in 0..2 {
        let backend = MemoryBackend::attach(store.clone());
        written += populate_node(&backend, &p, node, &config, 5);
    }
    assert_eq!(written, 103);
    assert_eq!(store.len(), 103);

    let backend = MemoryBackend::attach(store.clone());
    let v = backend.get("bucket_1_2", "key_1_2_0").unwrap().unwrap();
    assert_eq!(v.to_string().len(), 8);

    backend.empty().unwrap();
    assert_eq!(warmup_node(&backend, &p, 0, &config, 5), p.node_keys(0));
    assert_eq!(store.len() as u64, p.node_keys(0));
}

#[test]
fn test_seeding_survives_failing_backend() {
    let store = Arc::new(crate::backend::MemoryStore::new());
    let config = keyspace(200);
    let p = KeySpacePartitioner::new(200, 3, 2).unwrap();
    let faulty = BackendConfig::Memory(MemoryBackendConfig {
        seed_failure_pct: 40,
        ..Default::default()
    });

    let backend = MemoryBackend::attach(store.clone());
    backend.set_up(&faulty, 1).unwrap();
    assert_eq!(populate_node(&backend, &p, 1, &config, 5), p.node_keys(1));
    assert_eq!(store.len() as u64, p.node_keys(1));
    let reader = MemoryBackend::attach(store.clone());
    for thread in 0..2 {
        for idx in 0..p.max_key_index(1, thread) {
            let bucket = format!("bucket_1_{}", thread);
            let key = format!("key_1_{}_{}", thread, idx);
            assert!(reader.get(&bucket, &key).unwrap().is_some(), "{}/{}", bucket, key);
        }
    }
    let stats = backend.additional_stats();
    assert!(stats["BACKEND_INJECTED_FAILURES"].parse::<u64>().unwrap() > 0);

    // Warmup fills in what is missing through the same failures.
    backend.empty().unwrap();
    assert_eq!(warmup_node(&backend, &p, 0, &config, 5), p.node_keys(0));
    assert_eq!(store.len() as u64, p.node_keys(0));
}

#[test]
fn test_thread_seeds_differ() {
    let mut seeds = std::collections::HashSet::new();
    for node in 0..4 {
        for thread in 0..8 {
            assert!(seeds.insert(thread_seed(1, node, thread)));
        }
    }
}
