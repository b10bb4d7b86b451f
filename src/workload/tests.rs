use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::{backend::{Backend, BackendCapabilities, MemoryBackend, Value}, config::{BankConfig, BankWeights, RequestConfig, SyntheticConfig}, keygen::{KeyGenerator, KeySpacePartitioner, KeyspaceSnapshot}, utils::AtomicStruct};

use super::{build_factory, BankContext, BankOperation, BankWorkloadFactory, OpRange, SyntheticWorkloadFactory, TransactionShape, TransactionWorkload, TransactionWorkloadFactory, TxOutcome, WORLD_ACCOUNT};

fn keygen(num_keys: u64) -> KeyGenerator {
    let keyspace = AtomicStruct::new(KeyspaceSnapshot {
        partitioner: KeySpacePartitioner::new(num_keys, 1, 1).unwrap(),
        locality_probability: -1,
        no_contention: false,
        value_size: 8,
        bucket_prefix: String::from("t"),
    });
    KeyGenerator::new(0, 0, keyspace, 1)
}

fn run_one(factory: &dyn TransactionWorkloadFactory, backend: &dyn Backend, gen: &mut KeyGenerator, rng: &mut ChaCha20Rng) -> TransactionWorkload {
    let mut tx = factory.choose_transaction(rng, &BackendCapabilities::of(backend));
    let mut txn = backend.start_transaction().unwrap();
    tx.start_execution();
    let res = factory.execute(&tx, txn.as_mut(), gen, rng);
    tx.end_execution(res.is_ok());
    let committed = txn.end(res.is_ok()).is_ok() && res.is_ok();
    tx.end_commit(committed);
    tx
}

#[test]
fn test_op_range_parse() {
    assert_eq!("3,7".parse::<OpRange>().unwrap(), OpRange::new(3, 7).unwrap());
    assert_eq!(" 4 ".parse::<OpRange>().unwrap(), OpRange::new(4, 4).unwrap());
    assert_eq!("2, 9".parse::<OpRange>().unwrap(), OpRange::new(2, 9).unwrap());
    "7,3".parse::<OpRange>().expect_err("min > max");
    assert_eq!("0,3".parse::<OpRange>().unwrap(), OpRange::new(0, 3).unwrap());
    "a,b".parse::<OpRange>().expect_err("not numbers");
    "-1,3".parse::<OpRange>().expect_err("negative");

    let r = OpRange::new(2, 5).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    for _ in 0..1000 {
        let s = r.sample(&mut rng);
        assert!((2..=5).contains(&s));
    }
}

#[test]
fn test_workload_outcome_classification() {
    let mut tx = TransactionWorkload::new(true, TransactionShape::Synthetic { reads: 1, writes: 0 });
    assert_eq!(tx.outcome(), TxOutcome::ExecutionFailed);
    tx.start_execution();
    tx.end_execution(true);
    assert_eq!(tx.outcome(), TxOutcome::CommitFailed);
    tx.end_commit(true);
    assert_eq!(tx.outcome(), TxOutcome::Committed);
    assert!(tx.execution_duration() <= tx.execution_duration() + tx.commit_duration());
}

#[test]
fn test_synthetic_write_percentage() {
    let factory = SyntheticWorkloadFactory::new(&SyntheticConfig {
        write_tx_percentage: 25,
        read_only_tx_reads: String::from("2,4"),
        write_tx_reads: String::from("1"),
        write_tx_writes: String::from("3,3"),
    }).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let caps = BackendCapabilities::full();

    let samples = 20_000;
    let mut writes = 0;
    for _ in 0..samples {
        let tx = factory.choose_transaction(&mut rng, &caps);
        match tx.shape() {
            TransactionShape::Synthetic { reads, writes: w } if tx.is_read_only() => {
                assert!((2..=4).contains(&reads));
                assert_eq!(w, 0);
            },
            TransactionShape::Synthetic { reads, writes: w } => {
                assert_eq!(reads, 1);
                assert_eq!(w, 3);
                writes += 1;
            },
            other => panic!("Unexpected shape {:?}", other),
        }
    }
    let frac = writes as f64 / samples as f64;
    assert!((frac - 0.25).abs() < 0.02, "write fraction {}", frac);
}

#[test]
fn test_synthetic_passive_replication() {
    let factory = SyntheticWorkloadFactory::new(&SyntheticConfig::default()).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let backup = BackendCapabilities { is_coordinator: false, passive_replication: true, can_read_only: true, can_write: false };
    let primary = BackendCapabilities { is_coordinator: true, ..backup };
    for _ in 0..500 {
        assert!(factory.choose_transaction(&mut rng, &backup).is_read_only());
        assert!(!factory.choose_transaction(&mut rng, &primary).is_read_only());
    }
}

#[test]
fn test_synthetic_execute_writes_distinct_keys() {
    let factory = SyntheticWorkloadFactory::new(&SyntheticConfig {
        write_tx_percentage: 100,
        read_only_tx_reads: String::from("1"),
        write_tx_reads: String::from("2"),
        write_tx_writes: String::from("5"),
    }).unwrap();
    let backend = MemoryBackend::new();
    let mut gen = keygen(100);
    let mut rng = ChaCha20Rng::seed_from_u64(3);

    let tx = run_one(&factory, &backend, &mut gen, &mut rng);
    assert_eq!(tx.outcome(), TxOutcome::Committed);
    assert!(!tx.is_read_only());
    assert_eq!(backend.store().len(), 5);
}

#[test]
fn test_write_tx_without_reads() {
    let factory = SyntheticWorkloadFactory::new(&SyntheticConfig {
        write_tx_percentage: 100,
        read_only_tx_reads: String::from("1"),
        write_tx_reads: String::from("0"),
        write_tx_writes: String::from("3"),
    }).unwrap();
    let backend = MemoryBackend::new();
    let mut gen = keygen(100);
    let mut rng = ChaCha20Rng::seed_from_u64(4);

    let tx = run_one(&factory, &backend, &mut gen, &mut rng);
    assert_eq!(tx.shape(), TransactionShape::Synthetic { reads: 0, writes: 3 });
    assert_eq!(tx.outcome(), TxOutcome::Committed);
    assert_eq!(backend.store().len(), 3);

    SyntheticWorkloadFactory::new(&SyntheticConfig {
        write_tx_writes: String::from("0,2"),
        ..SyntheticConfig::default()
    }).err().expect("Write transactions need a write");
}

#[test]
fn test_synthetic_parameters() {
    let factory = SyntheticWorkloadFactory::new(&SyntheticConfig::default()).unwrap();
    assert_eq!(factory.set_parameter("write_tx_percentage", "150"), Some(false));
    assert_eq!(factory.current().write_tx_percentage, 20);
    assert_eq!(factory.set_parameter("write_tx_percentage", "60"), Some(true));
    assert_eq!(factory.current().write_tx_percentage, 60);
    assert_eq!(factory.set_parameter("write_tx_writes", "9,2"), Some(false));
    assert_eq!(factory.set_parameter("write_tx_writes", "2,9"), Some(true));
    assert_eq!(factory.current().write_tx_writes, OpRange::new(2, 9).unwrap());
    assert_eq!(factory.set_parameter("write_tx_writes", "0,3"), Some(false));
    assert_eq!(factory.set_parameter("write_tx_reads", "0,4"), Some(true));
    assert_eq!(factory.current().write_tx_reads, OpRange::new(0, 4).unwrap());
    assert_eq!(factory.set_parameter("no_such_thing", "1"), None);
}

#[test]
fn test_bank_total_preserved() {
    let config = BankConfig {
        num_accounts: 10,
        initial_amount: 1000,
        max_amount: 500,
        weights: BankWeights { transfer: 60, deposit: 20, withdraw: 20, check_all_accounts: 0 },
        bucket: String::from("bank"),
    };
    let factory = BankWorkloadFactory::new(&config).unwrap();
    let backend = MemoryBackend::new();
    let ctx = BankContext::new(&config);
    assert_eq!(ctx.populate(&backend), 11);

    let mut gen = keygen(1);
    let mut rng = ChaCha20Rng::seed_from_u64(99);
    let mut seen = [0usize; 3];
    for _ in 0..2000 {
        let tx = run_one(&factory, &backend, &mut gen, &mut rng);
        assert_eq!(tx.outcome(), TxOutcome::Committed);
        match tx.shape() {
            TransactionShape::Bank { op: BankOperation::Transfer, from, to, .. } => {
                assert_ne!(from, to);
                seen[0] += 1;
            },
            TransactionShape::Bank { op: BankOperation::Deposit, .. } => seen[1] += 1,
            TransactionShape::Bank { op: BankOperation::Withdraw, .. } => seen[2] += 1,
            other => panic!("Unexpected shape {:?}", other),
        }
    }
    assert!(seen.iter().all(|s| *s > 0));

    let mut txn = backend.start_transaction().unwrap();
    assert_eq!(ctx.check_all_accounts(txn.as_mut()).unwrap(), 11000);
    txn.end(false).unwrap();
}

#[test]
fn test_bank_check_detects_inconsistency() {
    let config = BankConfig {
        weights: BankWeights { transfer: 0, deposit: 0, withdraw: 0, check_all_accounts: 1 },
        ..Default::default()
    };
    let factory = BankWorkloadFactory::new(&config).unwrap();
    let backend = MemoryBackend::new();
    let ctx = BankContext::new(&config);
    ctx.populate(&backend);

    let mut gen = keygen(1);
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    let tx = run_one(&factory, &backend, &mut gen, &mut rng);
    assert!(tx.is_read_only());
    assert_eq!(tx.outcome(), TxOutcome::Committed);

    // Money appearing out of nowhere is what a broken isolation level looks like.
    backend.put(&ctx.bucket, WORLD_ACCOUNT, Value::Amount(ctx.initial_amount + 1)).unwrap();
    let tx = run_one(&factory, &backend, &mut gen, &mut rng);
    assert_eq!(tx.outcome(), TxOutcome::ExecutionFailed);
}

#[test]
fn test_bank_parameters() {
    let factory = BankWorkloadFactory::new(&BankConfig {
        weights: BankWeights { transfer: 1, deposit: 0, withdraw: 0, check_all_accounts: 0 },
        ..Default::default()
    }).unwrap();
    // Would leave every weight at zero.
    assert_eq!(factory.set_parameter("transfer_weight", "0"), Some(false));
    assert_eq!(factory.set_parameter("max_amount", "0"), Some(false));
    assert_eq!(factory.set_parameter("max_amount", "7"), Some(true));
    assert_eq!(factory.current().max_amount, 7);
    assert_eq!(factory.set_parameter("deposit_weight", "3"), Some(true));
    assert_eq!(factory.set_parameter("transfer_weight", "0"), Some(true));

    let mut rng = ChaCha20Rng::seed_from_u64(1);
    for _ in 0..100 {
        let tx = factory.choose_transaction(&mut rng, &BackendCapabilities::full());
        match tx.shape() {
            TransactionShape::Bank { op, amount, .. } => {
                assert_eq!(op, BankOperation::Deposit);
                assert!((1..=7).contains(&amount));
            },
            other => panic!("Unexpected shape {:?}", other),
        }
    }
}

#[test]
fn test_build_factory() {
    let f = build_factory(&RequestConfig::Synthetic(SyntheticConfig::default())).unwrap();
    assert_eq!(f.name(), "synthetic");
    let f = build_factory(&RequestConfig::Bank(BankConfig::default())).unwrap();
    assert_eq!(f.name(), "bank");
    build_factory(&RequestConfig::Synthetic(SyntheticConfig {
        read_only_tx_reads: String::from("x"),
        ..Default::default()
    })).err().expect("Unparseable range");
}
