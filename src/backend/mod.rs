// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::{fmt, io::Error};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;

mod memory;
pub use memory::*;


#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Amount(i64),
}

impl Value {
    pub fn as_amount(&self) -> Option<i64> {
        match self {
            Value::Amount(a) => Some(*a),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Amount(a) => write!(f, "{}", a),
        }
    }
}

/// One open transaction scope. Dropping it without calling `end` rolls back.
pub trait Transaction {
    fn get(&mut self, bucket: &str, key: &str) -> Result<Option<Value>, Error>;
    fn put(&mut self, bucket: &str, key: &str, value: Value) -> Result<(), Error>;

    /// Commit (`commit == true`) or roll back. A failed commit leaves nothing applied.
    fn end(self: Box<Self>, commit: bool) -> Result<(), Error>;
}

/// The storage/cache system under test.
/// Implementations must tolerate concurrent transactions from many threads;
/// the harness adds no locking of its own.
pub trait Backend: Send + Sync {
    fn set_up(&self, config: &BackendConfig, node_index: usize) -> Result<(), Error>;
    fn tear_down(&self) -> Result<(), Error>;

    /// Non-transactional access, used for seeding.
    fn put(&self, bucket: &str, key: &str, value: Value) -> Result<(), Error>;
    fn get(&self, bucket: &str, key: &str) -> Result<Option<Value>, Error>;

    fn start_transaction(&self) -> Result<Box<dyn Transaction + '_>, Error>;

    fn is_coordinator(&self) -> bool;
    fn is_passive_replication(&self) -> bool {
        false
    }
    fn can_execute_read_only_transactions(&self) -> bool {
        true
    }
    fn can_execute_write_transactions(&self) -> bool {
        true
    }

    /// Backend specific numbers merged into the stressor report.
    fn additional_stats(&self) -> IndexMap<String, String> {
        IndexMap::new()
    }

    /// Drops all content.
    fn empty(&self) -> Result<(), Error>;
}

/// Capability flags read once per stressor run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub is_coordinator: bool,
    pub passive_replication: bool,
    pub can_read_only: bool,
    pub can_write: bool,
}

impl BackendCapabilities {
    pub fn of(backend: &dyn Backend) -> Self {
        Self {
            is_coordinator: backend.is_coordinator(),
            passive_replication: backend.is_passive_replication(),
            can_read_only: backend.can_execute_read_only_transactions(),
            can_write: backend.can_execute_write_transactions(),
        }
    }

    pub fn full() -> Self {
        Self {
            is_coordinator: true,
            passive_replication: false,
            can_read_only: true,
            can_write: true,
        }
    }
}
