// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::thread;

use log::{info, warn};

use crate::{backend::{Backend, Value}, config::KeyspaceConfig, keygen::{create_bucket, create_key, KeyGenerator, KeySpacePartitioner, KeyspaceSnapshot}, utils::{retry_forever, AtomicStruct}};

use super::thread_seed;

/// One seeded item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PopulationEntry {
    bucket: String,
    key: String,
    value: String,
}

/// Warmup re-writes exactly what population would have written.
pub type WarmupEntry = PopulationEntry;

impl PopulationEntry {
    pub fn new(bucket: String, key: String, value: String) -> Self {
        Self { bucket, key, value }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Retries until the backend takes it.
    pub fn store(&self, backend: &dyn Backend) {
        retry_forever(&format!("Put {}/{}", self.bucket, self.key), || {
            backend.put(&self.bucket, &self.key, Value::Text(self.value.clone()))
        });
    }
}

fn value_source(partitioner: &KeySpacePartitioner, config: &KeyspaceConfig, node: usize, thread: usize, seed: u64) -> KeyGenerator {
    let keyspace = AtomicStruct::new(KeyspaceSnapshot {
        partitioner: *partitioner,
        locality_probability: config.locality_probability,
        no_contention: true,
        value_size: config.value_size,
        bucket_prefix: config.bucket_prefix.clone(),
    });
    KeyGenerator::new(node, thread, keyspace, thread_seed(seed, node, thread))
}

/// Runs `per_thread` for every partition thread of `node`, one OS thread each, and sums the results.
fn for_each_partition<F>(partitioner: &KeySpacePartitioner, node: usize, per_thread: F) -> u64
where
    F: Fn(usize) -> u64 + Sync,
{
    let per_thread = &per_thread;
    thread::scope(|s| {
        let handles = (0..partitioner.num_threads())
            .map(|t| s.spawn(move || per_thread(t)))
            .collect::<Vec<_>>();
        handles.into_iter()
            .map(|h| match h.join() {
                Ok(n) => n,
                Err(_) => {
                    warn!("Seeding thread panicked");
                    0
                }
            })
            .sum()
    })
}

/// Writes every key `node` owns. Returns how many were written.
pub fn populate_node(backend: &dyn Backend, partitioner: &KeySpacePartitioner, node: usize, config: &KeyspaceConfig, seed: u64) -> u64 {
    let total = for_each_partition(partitioner, node, |thread| {
        let mut values = value_source(partitioner, config, node, thread, seed);
        let bucket = create_bucket(&config.bucket_prefix, node, thread);
        let max = partitioner.max_key_index(node, thread);
        for idx in 0..max {
            PopulationEntry::new(bucket.clone(), create_key(node, thread, idx), values.random_value())
                .store(backend);
        }
        max
    });
    info!("Node {} populated {} keys", node, total);
    total
}

/// Reads every key `node` owns, re-writing the ones that are missing. Returns how many were touched.
pub fn warmup_node(backend: &dyn Backend, partitioner: &KeySpacePartitioner, node: usize, config: &KeyspaceConfig, seed: u64) -> u64 {
    let total = for_each_partition(partitioner, node, |thread| {
        let mut values = value_source(partitioner, config, node, thread, seed);
        let bucket = create_bucket(&config.bucket_prefix, node, thread);
        let max = partitioner.max_key_index(node, thread);
        for idx in 0..max {
            let key = create_key(node, thread, idx);
            let existing = retry_forever(&format!("Get {}/{}", bucket, key), || backend.get(&bucket, &key));
            if existing.is_none() {
                WarmupEntry::new(bucket.clone(), key, values.random_value()).store(backend);
            }
        }
        max
    });
    info!("Node {} warmed up {} keys", node, total);
    total
}
