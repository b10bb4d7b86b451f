// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use crate::{config::{KeyspaceConfig, StressorConfig}, utils::{parse_positive, ParameterTable, Setter}};

/// Every tunable of a stressor, in one place so a single table can reach them all.
#[derive(Clone, Debug, PartialEq)]
pub struct StressorSettings {
    pub num_nodes: usize,
    pub keyspace: KeyspaceConfig,
    pub stressor: StressorConfig,
}

fn set_number_of_keys(s: &mut StressorSettings, v: &str) -> bool {
    parse_positive::<u64>(v).map(|n| s.keyspace.num_keys = n).is_some()
}

fn set_value_size(s: &mut StressorSettings, v: &str) -> bool {
    parse_positive::<usize>(v).map(|n| s.keyspace.value_size = n).is_some()
}

fn set_number_of_threads(s: &mut StressorSettings, v: &str) -> bool {
    parse_positive::<usize>(v).map(|n| s.stressor.num_threads = n).is_some()
}

fn set_number_of_nodes(s: &mut StressorSettings, v: &str) -> bool {
    parse_positive::<usize>(v).map(|n| s.num_nodes = n).is_some()
}

/// Negative turns locality off; anything above 100 is rejected.
fn set_locality_probability(s: &mut StressorSettings, v: &str) -> bool {
    match v.trim().parse::<i32>() {
        Ok(p) if p > 100 => false,
        Ok(p) => {
            s.keyspace.locality_probability = p.max(-1);
            true
        },
        Err(_) => false,
    }
}

fn set_no_contention(s: &mut StressorSettings, v: &str) -> bool {
    v.trim().parse::<bool>().map(|b| s.keyspace.no_contention = b).is_ok()
}

fn set_bucket_prefix(s: &mut StressorSettings, v: &str) -> bool {
    let v = v.trim();
    if v.is_empty() {
        return false;
    }
    s.keyspace.bucket_prefix = v.to_string();
    true
}

/// Milliseconds.
fn set_simulation_time(s: &mut StressorSettings, v: &str) -> bool {
    parse_positive::<u64>(v).map(|t| s.stressor.simulation_time_ms = t).is_some()
}

/// Milliseconds; 0 disables warmup.
fn set_warmup_time(s: &mut StressorSettings, v: &str) -> bool {
    v.trim().parse::<u64>().map(|t| s.stressor.warmup_time_ms = t).is_ok()
}

fn set_coordinator_participation(s: &mut StressorSettings, v: &str) -> bool {
    v.trim().parse::<bool>().map(|b| s.stressor.coordinator_participation = b).is_ok()
}

pub const STRESSOR_PARAMETERS: &ParameterTable<StressorSettings> = &[
    ("number_of_keys", set_number_of_keys as Setter<StressorSettings>),
    ("value_size", set_value_size),
    ("number_of_threads", set_number_of_threads),
    ("number_of_nodes", set_number_of_nodes),
    ("locality_probability", set_locality_probability),
    ("no_contention", set_no_contention),
    ("bucket_prefix", set_bucket_prefix),
    ("simulation_time", set_simulation_time),
    ("warmup_time", set_warmup_time),
    ("coordinator_participation", set_coordinator_participation),
];
