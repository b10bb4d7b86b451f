// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::{fmt, io::{Error, ErrorKind}, ops::Range};

use serde::{Deserialize, Serialize};

/// Coordinates of one key: the (node, thread) that owns it and its index in that owner's range.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyRef {
    pub node: usize,
    pub thread: usize,
    pub idx: u64,
}

impl KeyRef {
    pub fn key(&self) -> String {
        create_key(self.node, self.thread, self.idx)
    }
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key_{}_{}_{}", self.node, self.thread, self.idx)
    }
}

/// Stable identifier of key `idx` in the range owned by (node, thread).
pub fn create_key(node: usize, thread: usize, idx: u64) -> String {
    format!("key_{}_{}_{}", node, thread, idx)
}

/// Namespace holding the keys owned by (node, thread).
pub fn create_bucket(prefix: &str, node: usize, thread: usize) -> String {
    format!("{}_{}_{}", prefix, node, thread)
}

/// Splits `[0, num_keys)` into one contiguous range per (node, thread).
///
/// Node `n` owns `num_keys / num_nodes` keys, plus one if `n < num_keys % num_nodes`.
/// A node's keys are then split the same way among its threads, so the first
/// `node_keys % num_threads` threads get one extra key.
/// Ranges are laid out node-major: all of node 0 (thread 0, thread 1, ...), then node 1, ...
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySpacePartitioner {
    num_keys: u64,
    num_nodes: usize,
    num_threads: usize,
}

impl KeySpacePartitioner {
    pub fn new(num_keys: u64, num_nodes: usize, num_threads: usize) -> Result<Self, Error> {
        if num_nodes == 0 || num_threads == 0 {
            return Err(Error::new(ErrorKind::InvalidInput,
                format!("Need at least one node and one thread, got {} nodes and {} threads", num_nodes, num_threads)));
        }
        Ok(Self { num_keys, num_nodes, num_threads })
    }

    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    fn keys_per_node(&self) -> u64 {
        self.num_keys / self.num_nodes as u64
    }

    fn node_remainder(&self) -> u64 {
        self.num_keys % self.num_nodes as u64
    }

    /// Number of keys owned by `node` across all of its threads.
    pub fn node_keys(&self, node: usize) -> u64 {
        if node >= self.num_nodes {
            return 0;
        }
        self.keys_per_node() + if (node as u64) < self.node_remainder() { 1 } else { 0 }
    }

    /// Number of keys owned by (node, thread). Valid indices are `[0, max_key_index)`.
    pub fn max_key_index(&self, node: usize, thread: usize) -> u64 {
        if thread >= self.num_threads {
            return 0;
        }
        let node_keys = self.node_keys(node);
        let threads = self.num_threads as u64;
        node_keys / threads + if (thread as u64) < node_keys % threads { 1 } else { 0 }
    }

    /// Nodes owning at least one key. They always form the prefix `[0, nodes_with_keys)`.
    pub fn nodes_with_keys(&self) -> usize {
        if self.keys_per_node() > 0 {
            self.num_nodes
        } else {
            self.node_remainder() as usize
        }
    }

    /// Threads of `node` owning at least one key, again a prefix.
    pub fn threads_with_keys(&self, node: usize) -> usize {
        let node_keys = self.node_keys(node);
        let threads = self.num_threads as u64;
        if node_keys >= threads {
            self.num_threads
        } else {
            node_keys as usize
        }
    }

    fn node_offset(&self, node: usize) -> u64 {
        let node = node as u64;
        node * self.keys_per_node() + node.min(self.node_remainder())
    }

    fn thread_offset(&self, node: usize, thread: usize) -> u64 {
        let node_keys = self.node_keys(node);
        let threads = self.num_threads as u64;
        let thread = thread as u64;
        self.node_offset(node) + thread * (node_keys / threads) + thread.min(node_keys % threads)
    }

    /// Position of (node, thread)'s keys in the flattened key space.
    pub fn global_range(&self, node: usize, thread: usize) -> Range<u64> {
        let start = self.thread_offset(node, thread);
        start..(start + self.max_key_index(node, thread))
    }

    pub fn global_index(&self, key: &KeyRef) -> u64 {
        self.thread_offset(key.node, key.thread) + key.idx
    }

    /// Inverse of `global_index`.
    pub fn locate(&self, global: u64) -> Option<KeyRef> {
        if global >= self.num_keys {
            return None;
        }
        let (node, in_node) = split_uniform(global, self.keys_per_node(), self.node_remainder());
        let node_keys = self.node_keys(node);
        let threads = self.num_threads as u64;
        let (thread, idx) = split_uniform(in_node, node_keys / threads, node_keys % threads);
        Some(KeyRef { node, thread, idx })
    }

    pub fn create_key(&self, node: usize, thread: usize, idx: u64) -> String {
        create_key(node, thread, idx)
    }
}

/// `pos` falls in a sequence of buckets where the first `remainder` buckets hold `base + 1`
/// items and the rest hold `base`. Returns (bucket, offset in bucket).
fn split_uniform(pos: u64, base: u64, remainder: u64) -> (usize, u64) {
    let big = base + 1;
    let big_span = remainder * big;
    if pos < big_span {
        ((pos / big) as usize, pos % big)
    } else {
        let rest = pos - big_span;
        ((remainder + rest / base) as usize, rest % base)
    }
}
