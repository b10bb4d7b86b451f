// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use serde::{Deserialize, Serialize};

fn default_locality_probability() -> i32 {
    -1
}

fn default_bucket_prefix() -> String {
    String::from("bucket")
}

fn default_true() -> bool {
    true
}

/// Shape of the key space shared by population, warmup and stress stages.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct KeyspaceConfig {
    pub num_keys: u64,
    /// Values are `value_size / 2` characters long.
    pub value_size: usize,
    /// Percent chance a key targets the local node. Negative disables locality.
    #[serde(default = "default_locality_probability")]
    pub locality_probability: i32,
    #[serde(default)]
    pub no_contention: bool,
    #[serde(default = "default_bucket_prefix")]
    pub bucket_prefix: String,
}

impl Default for KeyspaceConfig {
    fn default() -> Self {
        Self {
            num_keys: 1000,
            value_size: 100,
            locality_probability: default_locality_probability(),
            no_contention: false,
            bucket_prefix: default_bucket_prefix(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StressorConfig {
    pub num_threads: usize,
    pub simulation_time_ms: u64,
    /// Statistics gathered during warmup are thrown away.
    #[serde(default)]
    pub warmup_time_ms: u64,
    /// When false, the coordinator node sleeps through the run instead of generating load.
    #[serde(default = "default_true")]
    pub coordinator_participation: bool,
    #[serde(default)]
    pub pin_threads: bool,
    /// Base seed for per-thread generators. Random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for StressorConfig {
    fn default() -> Self {
        Self {
            num_threads: 4,
            simulation_time_ms: 10_000,
            warmup_time_ms: 0,
            coordinator_participation: true,
            pin_threads: false,
            seed: None,
        }
    }
}

/// Mixed read-only / read-write transactions over the generated key space.
/// Operation counts are `"min,max"` or a single number.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SyntheticConfig {
    pub write_tx_percentage: u32,
    pub read_only_tx_reads: String,
    pub write_tx_reads: String,
    pub write_tx_writes: String,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            write_tx_percentage: 20,
            read_only_tx_reads: String::from("5,10"),
            write_tx_reads: String::from("1,5"),
            write_tx_writes: String::from("1,2"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BankWeights {
    pub transfer: u32,
    pub deposit: u32,
    pub withdraw: u32,
    pub check_all_accounts: u32,
}

impl Default for BankWeights {
    fn default() -> Self {
        Self {
            transfer: 70,
            deposit: 10,
            withdraw: 10,
            check_all_accounts: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BankConfig {
    pub num_accounts: usize,
    pub initial_amount: i64,
    /// Upper bound of a single transfer/deposit/withdraw amount.
    pub max_amount: i64,
    #[serde(default)]
    pub weights: BankWeights,
    #[serde(default = "default_bank_bucket")]
    pub bucket: String,
}

fn default_bank_bucket() -> String {
    String::from("bank")
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            num_accounts: 10,
            initial_amount: 1000,
            max_amount: 100,
            weights: BankWeights::default(),
            bucket: default_bank_bucket(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum RequestConfig {
    Synthetic(SyntheticConfig),
    Bank(BankConfig),
}
