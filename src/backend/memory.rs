// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::{collections::HashMap, io::{Error, ErrorKind}, sync::{atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering}, Arc, Mutex, MutexGuard}};

use indexmap::IndexMap;
use log::{debug, trace};
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;

use crate::config::BackendConfig;

use super::{Backend, Transaction, Value};

type Buckets = HashMap<String, HashMap<String, Value>>;

/// The data itself. Several `MemoryBackend`s (one per simulated node) can share one store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Buckets>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Buckets>, Error> {
        self.data.lock()
            .map_err(|_| Error::new(ErrorKind::Other, "Memory store lock poisoned"))
    }

    pub fn len(&self) -> usize {
        match self.lock() {
            Ok(data) => data.values().map(|b| b.len()).sum(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reference backend holding everything in a process-local map.
/// Transactions take the store lock for their whole lifetime, so they are serializable.
/// Failures can be injected into reads/writes and commits to exercise the failure paths.
#[derive(Debug)]
pub struct MemoryBackend {
    store: Arc<MemoryStore>,
    coordinator: AtomicBool,
    passive_replication: AtomicBool,
    exec_failure_pct: AtomicU32,
    commit_failure_pct: AtomicU32,
    seed_failure_pct: AtomicU32,
    fault_rng: Mutex<ChaCha20Rng>,

    num_commits: AtomicU64,
    num_rollbacks: AtomicU64,
    num_injected_failures: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::attach(Arc::new(MemoryStore::new()))
    }

    pub fn attach(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            coordinator: AtomicBool::new(true),
            passive_replication: AtomicBool::new(false),
            exec_failure_pct: AtomicU32::new(0),
            commit_failure_pct: AtomicU32::new(0),
            seed_failure_pct: AtomicU32::new(0),
            fault_rng: Mutex::new(ChaCha20Rng::seed_from_u64(210)),
            num_commits: AtomicU64::new(0),
            num_rollbacks: AtomicU64::new(0),
            num_injected_failures: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    fn inject_failure(&self, pct: &AtomicU32) -> bool {
        let pct = pct.load(Ordering::Relaxed);
        if pct == 0 {
            return false;
        }
        let roll = match self.fault_rng.lock() {
            Ok(mut rng) => rng.gen_range(0..100),
            Err(_) => return false,
        };
        if roll < pct {
            self.num_injected_failures.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryTransaction<'a> {
    backend: &'a MemoryBackend,
    data: MutexGuard<'a, Buckets>,
    writes: HashMap<(String, String), Value>,
}

impl<'a> Transaction for MemoryTransaction<'a> {
    fn get(&mut self, bucket: &str, key: &str) -> Result<Option<Value>, Error> {
        if self.backend.inject_failure(&self.backend.exec_failure_pct) {
            return Err(Error::new(ErrorKind::Other, format!("Injected read failure on {}/{}", bucket, key)));
        }
        if let Some(v) = self.writes.get(&(bucket.to_string(), key.to_string())) {
            return Ok(Some(v.clone()));
        }
        Ok(self.data.get(bucket).and_then(|b| b.get(key)).cloned())
    }

    fn put(&mut self, bucket: &str, key: &str, value: Value) -> Result<(), Error> {
        if self.backend.inject_failure(&self.backend.exec_failure_pct) {
            return Err(Error::new(ErrorKind::Other, format!("Injected write failure on {}/{}", bucket, key)));
        }
        self.writes.insert((bucket.to_string(), key.to_string()), value);
        Ok(())
    }

    fn end(self: Box<Self>, commit: bool) -> Result<(), Error> {
        let MemoryTransaction { backend, mut data, writes } = *self;
        if !commit {
            backend.num_rollbacks.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        if backend.inject_failure(&backend.commit_failure_pct) {
            backend.num_rollbacks.fetch_add(1, Ordering::Relaxed);
            return Err(Error::new(ErrorKind::Other, "Injected commit failure"));
        }
        for ((bucket, key), value) in writes {
            data.entry(bucket).or_default().insert(key, value);
        }
        backend.num_commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Backend for MemoryBackend {
    fn set_up(&self, config: &BackendConfig, node_index: usize) -> Result<(), Error> {
        let BackendConfig::Memory(config) = config;
        if config.exec_failure_pct > 100 || config.commit_failure_pct > 100 {
            return Err(Error::new(ErrorKind::InvalidInput, "Failure percentages must be <= 100"));
        }
        // Seeding retries forever, so it must be able to succeed eventually.
        if config.seed_failure_pct >= 100 {
            return Err(Error::new(ErrorKind::InvalidInput, "seed_failure_pct must be < 100"));
        }
        self.coordinator.store(node_index == config.coordinator_index, Ordering::SeqCst);
        self.passive_replication.store(config.passive_replication, Ordering::SeqCst);
        self.exec_failure_pct.store(config.exec_failure_pct, Ordering::SeqCst);
        self.commit_failure_pct.store(config.commit_failure_pct, Ordering::SeqCst);
        self.seed_failure_pct.store(config.seed_failure_pct, Ordering::SeqCst);
        if let Ok(mut rng) = self.fault_rng.lock() {
            *rng = ChaCha20Rng::seed_from_u64(config.seed ^ (node_index as u64).wrapping_mul(0x9e3779b97f4a7c15));
        }
        debug!("Memory backend set up for node {} (coordinator: {})", node_index, node_index == config.coordinator_index);
        Ok(())
    }

    fn tear_down(&self) -> Result<(), Error> {
        trace!("Memory backend torn down after {} commits", self.num_commits.load(Ordering::Relaxed));
        Ok(())
    }

    fn put(&self, bucket: &str, key: &str, value: Value) -> Result<(), Error> {
        if self.inject_failure(&self.seed_failure_pct) {
            return Err(Error::new(ErrorKind::Other, format!("Injected put failure on {}/{}", bucket, key)));
        }
        let mut data = self.store.lock()?;
        data.entry(bucket.to_string()).or_default().insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Option<Value>, Error> {
        if self.inject_failure(&self.seed_failure_pct) {
            return Err(Error::new(ErrorKind::Other, format!("Injected get failure on {}/{}", bucket, key)));
        }
        let data = self.store.lock()?;
        Ok(data.get(bucket).and_then(|b| b.get(key)).cloned())
    }

    fn start_transaction(&self) -> Result<Box<dyn Transaction + '_>, Error> {
        Ok(Box::new(MemoryTransaction {
            backend: self,
            data: self.store.lock()?,
            writes: HashMap::new(),
        }))
    }

    fn is_coordinator(&self) -> bool {
        self.coordinator.load(Ordering::SeqCst)
    }

    fn is_passive_replication(&self) -> bool {
        self.passive_replication.load(Ordering::SeqCst)
    }

    /// Under passive replication only the primary (coordinator) accepts writes.
    fn can_execute_write_transactions(&self) -> bool {
        !self.is_passive_replication() || self.is_coordinator()
    }

    fn additional_stats(&self) -> IndexMap<String, String> {
        let mut stats = IndexMap::new();
        stats.insert(String::from("BACKEND_COMMITS"), self.num_commits.load(Ordering::Relaxed).to_string());
        stats.insert(String::from("BACKEND_ROLLBACKS"), self.num_rollbacks.load(Ordering::Relaxed).to_string());
        stats.insert(String::from("BACKEND_INJECTED_FAILURES"), self.num_injected_failures.load(Ordering::Relaxed).to_string());
        stats.insert(String::from("BACKEND_ENTRIES"), self.store.len().to_string());
        stats
    }

    fn empty(&self) -> Result<(), Error> {
        self.store.lock()?.clear();
        Ok(())
    }
}
