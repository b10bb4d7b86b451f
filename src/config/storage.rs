// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MemoryBackendConfig {
    /// Node that reports `is_coordinator() == true`.
    pub coordinator_index: usize,
    pub passive_replication: bool,
    /// Percent of transactional reads/writes that fail.
    pub exec_failure_pct: u32,
    /// Percent of commits that fail (and roll back).
    pub commit_failure_pct: u32,
    /// Percent of plain puts/gets (the seeding path) that fail. Must stay below 100.
    #[serde(default)]
    pub seed_failure_pct: u32,
    pub seed: u64,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self {
            coordinator_index: 0,
            passive_replication: false,
            exec_failure_pct: 0,
            commit_failure_pct: 0,
            seed_failure_pct: 0,
            seed: 210,
        }
    }
}


#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum BackendConfig {
    Memory(MemoryBackendConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory(MemoryBackendConfig::default())
    }
}
