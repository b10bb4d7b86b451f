// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::{sync::{atomic::{AtomicBool, Ordering}, Arc, Barrier}, thread, time::{Duration, Instant}};

use core_affinity::CoreId;
use log::{debug, trace, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::{backend::{Backend, BackendCapabilities}, keygen::{KeyGenerator, SharedKeyspace}, workload::TransactionWorkloadFactory};

use super::ThreadStats;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Everything one worker needs. Built by the controlling thread, moved into the worker.
pub struct WorkerTask<'a> {
    pub node_index: usize,
    pub thread_index: usize,
    pub seed: u64,
    pub backend: &'a dyn Backend,
    pub caps: BackendCapabilities,
    pub factory: Arc<dyn TransactionWorkloadFactory>,
    pub keyspace: SharedKeyspace,
    pub barrier: &'a Barrier,
    pub stop: &'a AtomicBool,
    /// False only for a coordinator that sits the run out.
    pub generate_load: bool,
    pub core: Option<CoreId>,
}

/// Per-thread seed derived from the run seed. Distinct for every (node, thread).
pub fn thread_seed(base: u64, node: usize, thread: usize) -> u64 {
    let salt = ((node as u64) << 32) | thread as u64;
    base ^ salt.wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

/// Body of one worker thread. Loops until the stop flag is seen, classifying every transaction.
/// Failures are counted, never propagated.
pub fn run_worker(task: WorkerTask<'_>) -> ThreadStats {
    if let Some(core) = task.core {
        if !core_affinity::set_for_current(core) {
            warn!("Could not pin worker {} to core {}", task.thread_index, core.id);
        }
    }

    let mut keygen = KeyGenerator::new(task.node_index, task.thread_index, task.keyspace.clone(), task.seed);
    let mut rng = ChaCha20Rng::seed_from_u64(task.seed.rotate_left(17));
    let mut stats = ThreadStats::new();

    task.barrier.wait();
    let start = Instant::now();

    if !task.generate_load {
        debug!("Coordinator worker {} not participating", task.thread_index);
        while !task.stop.load(Ordering::Acquire) {
            thread::sleep(IDLE_POLL_INTERVAL);
        }
        stats.duration = start.elapsed();
        return stats;
    }

    while !task.stop.load(Ordering::Acquire) {
        let mut tx = task.factory.choose_transaction(&mut rng, &task.caps);
        tx.start_execution();

        let mut txn = match task.backend.start_transaction() {
            Ok(txn) => txn,
            Err(e) => {
                trace!("Could not start transaction: {}", e);
                tx.end_execution(false);
                stats.record(&tx);
                continue;
            }
        };

        match task.factory.execute(&tx, txn.as_mut(), &mut keygen, &mut rng) {
            Ok(()) => {
                tx.end_execution(true);
                let res = txn.end(true);
                if let Err(e) = &res {
                    trace!("Commit failed: {}", e);
                }
                tx.end_commit(res.is_ok());
            },
            Err(e) => {
                tx.end_execution(false);
                trace!("Execution failed: {}", e);
                if let Err(e) = txn.end(false) {
                    trace!("Rollback failed: {}", e);
                }
            }
        }

        stats.record(&tx);
    }

    stats.duration = start.elapsed();
    trace!("Worker {} done: {} committed, {} failed", task.thread_index, stats.committed(), stats.failures());
    stats
}
