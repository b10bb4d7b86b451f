// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use rand::{distributions::Uniform, prelude::*};
use rand_chacha::ChaCha20Rng;

use crate::utils::AtomicStruct;

use super::{create_bucket, KeyRef, KeySpacePartitioner};

/// Immutable view of the key space a stressor run reads.
/// Replaced as a whole whenever a tunable changes.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyspaceSnapshot {
    pub partitioner: KeySpacePartitioner,
    /// Negative: no locality. 0..=100: percent of keys aimed at the local node.
    pub locality_probability: i32,
    pub no_contention: bool,
    pub value_size: usize,
    pub bucket_prefix: String,
}

pub type SharedKeyspace = AtomicStruct<KeyspaceSnapshot>;

/// Per-thread key and value source, bound to one (node, thread) pair.
/// Owns its random source, so it is never shared between threads.
pub struct KeyGenerator {
    node: usize,
    thread: usize,
    keyspace: SharedKeyspace,
    rng: ChaCha20Rng,
    char_dist: Uniform<u8>,
}

impl KeyGenerator {
    pub fn new(node: usize, thread: usize, keyspace: SharedKeyspace, seed: u64) -> KeyGenerator {
        KeyGenerator {
            node,
            thread,
            keyspace,
            rng: ChaCha20Rng::seed_from_u64(seed),
            char_dist: Uniform::new_inclusive(b'a', b'z'),
        }
    }

    pub fn node_index(&self) -> usize {
        self.node
    }

    pub fn thread_index(&self) -> usize {
        self.thread
    }

    pub fn snapshot(&self) -> std::sync::Arc<KeyspaceSnapshot> {
        self.keyspace.get()
    }

    /// This thread's own namespace.
    pub fn bucket(&self) -> String {
        create_bucket(&self.keyspace.get().bucket_prefix, self.node, self.thread)
    }

    /// Namespace of the thread that owns `key`.
    pub fn bucket_of(&self, key: &KeyRef) -> String {
        create_bucket(&self.keyspace.get().bucket_prefix, key.node, key.thread)
    }

    pub fn random_value(&mut self) -> String {
        let len = self.keyspace.get().value_size / 2;
        (0..len)
            .map(|_| self.rng.sample(self.char_dist) as char)
            .collect()
    }

    /// Picks a key according to the current snapshot's policy.
    /// `None` only when the relevant part of the key space is empty.
    pub fn random_key(&mut self) -> Option<KeyRef> {
        let snap = self.keyspace.get();
        self.random_key_in(&snap)
    }

    fn random_key_in(&mut self, snap: &KeyspaceSnapshot) -> Option<KeyRef> {
        let part = &snap.partitioner;

        if snap.no_contention {
            return self.key_in(part, self.node, self.thread);
        }

        let nodes = part.nodes_with_keys();
        if nodes == 0 {
            return None;
        }

        let node = if snap.locality_probability < 0 {
            self.rng.gen_range(0..nodes)
        } else {
            self.pick_node_with_locality(snap.locality_probability, nodes)
        };

        let threads = part.threads_with_keys(node);
        let thread = self.rng.gen_range(0..threads);
        self.key_in(part, node, thread)
    }

    fn pick_node_with_locality(&mut self, locality: i32, nodes: usize) -> usize {
        let local_has_keys = self.node < nodes;
        if local_has_keys && self.rng.gen_range(0..100) < locality {
            return self.node;
        }

        let node = self.rng.gen_range(0..nodes);
        if node == self.node && nodes > 1 {
            // Known bias: the neighbour is favoured when few nodes exist.
            (node + 1) % nodes
        } else {
            node
        }
    }

    fn key_in(&mut self, part: &KeySpacePartitioner, node: usize, thread: usize) -> Option<KeyRef> {
        let max = part.max_key_index(node, thread);
        if max == 0 {
            return None;
        }
        Some(KeyRef { node, thread, idx: self.rng.gen_range(0..max) })
    }

    /// Up to `n` distinct keys. One starting key is drawn as in `random_key`; the rest are the
    /// keys that follow it in the relevant range, wrapping at the end.
    /// Returns `min(n, available)` keys and visits the range at most once.
    pub fn unique_random_keys(&mut self, n: usize) -> Vec<KeyRef> {
        let snap = self.keyspace.get();
        let part = snap.partitioner;
        let range = if snap.no_contention {
            part.global_range(self.node, self.thread)
        } else {
            0..part.num_keys()
        };
        let available = range.end - range.start;
        let target = (n as u64).min(available) as usize;
        if target == 0 {
            return Vec::new();
        }

        let first = match self.random_key_in(&snap) {
            Some(k) => k,
            None => return Vec::new(),
        };
        let start = part.global_index(&first);
        let mut keys = Vec::with_capacity(target);
        keys.push(first);

        let mut pos = start;
        while keys.len() < target {
            pos += 1;
            if pos >= range.end {
                pos = range.start;
            }
            if pos == start {
                break;
            }
            match part.locate(pos) {
                Some(k) => keys.push(k),
                None => break,
            }
        }

        keys
    }
}
