// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use serde::{Deserialize, Serialize};
use serde_json::Result;

use crate::stage::StageSpec;



/// Default config for log4rs;
mod log4rs;
pub use log4rs::*;

mod workloads;
pub use workloads::*;

mod storage;
pub use storage::*;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NodeInfo {
    pub name: String,
    pub addr: String,
}

fn default_connect_max_retry() -> i32 {
    10
}

fn default_recv_buffer_size() -> u32 {
    1 << 15
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClusterConfig {
    pub nodes: Vec<NodeInfo>, // Index in this list is the node index. Must match every node's own config.
    #[serde(default = "default_connect_max_retry")]
    pub connect_max_retry: i32,
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: u32,
}

/// Config of one node process in a distributed run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NodeConfig {
    pub node_index: usize,
    pub cluster_size: usize,
    pub addr: String,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: u32,
}

fn default_true() -> bool {
    true
}

/// A full benchmark: who takes part and which stages run, in order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct BenchmarkConfig {
    pub cluster: ClusterConfig,
    /// Used when the whole cluster runs inside one process.
    #[serde(default)]
    pub backend: BackendConfig,
    pub stages: Vec<StageSpec>,
    #[serde(default = "default_true")]
    pub abort_on_failure: bool,
}

impl BenchmarkConfig {
    pub fn serialize(self: &Self) -> String {
        serde_json::to_string_pretty(self).expect("Invalid Config")
    }

    pub fn deserialize(s: &str) -> Result<BenchmarkConfig> {
        serde_json::from_str(s)
    }
}

impl NodeConfig {
    pub fn serialize(self: &Self) -> String {
        serde_json::to_string_pretty(self).expect("Invalid Config")
    }

    pub fn deserialize(s: &str) -> Result<NodeConfig> {
        serde_json::from_str(s)
    }
}
