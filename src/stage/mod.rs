// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

//! A stage is one phase of a benchmark run, executed identically on every node.
//! Each node answers with exactly one `Ack`; the coordinator reduces them into a `StageOutcome`.

use std::{any::Any, collections::{BTreeMap, HashMap}, fmt, panic::{self, AssertUnwindSafe}, sync::{Arc, Mutex}};

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::{backend::Backend, stressor::Report};

mod stages;
pub use stages::*;


#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum AckPayload {
    Report(Report),
    Total(i64),
}

/// One node's answer for one stage. Either it succeeded (maybe with a payload) or it carries an error.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Ack {
    pub node_index: usize,
    pub address: String,
    pub payload: Option<AckPayload>,
    pub error: Option<String>,
}

impl Ack {
    pub fn ok(node_index: usize, address: &str, payload: Option<AckPayload>) -> Self {
        Self { node_index, address: address.to_string(), payload, error: None }
    }

    pub fn error(node_index: usize, address: &str, msg: String) -> Self {
        Self { node_index, address: address.to_string(), payload: None, error: Some(msg) }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// How the payloads of successful Acks are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeMode {
    PerNode,
    Sum,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub enum MergedPayload {
    Empty,
    PerNode(BTreeMap<usize, AckPayload>),
    Total(i64),
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct StageOutcome {
    pub stage: String,
    pub success: bool,
    pub payload: MergedPayload,
    /// (node index, message) of every failure found while reducing.
    pub errors: Vec<(usize, String)>,
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stage {}: {}", self.stage, if self.success { "OK" } else { "FAILED" })?;
        for (node, msg) in &self.errors {
            write!(f, "\n  node {}: {}", node, msg)?;
        }
        Ok(())
    }
}

/// Default reduction: success iff every node in `0..cluster_size` answered exactly once
/// and no Ack carries an error.
pub fn reduce_acks(stage: &str, mode: MergeMode, acks: &[Ack], cluster_size: usize) -> StageOutcome {
    let mut errors = Vec::new();
    let mut seen = vec![false; cluster_size];

    for ack in acks {
        match seen.get_mut(ack.node_index) {
            Some(s) if *s => errors.push((ack.node_index, String::from("Duplicate acknowledgement"))),
            Some(s) => *s = true,
            None => errors.push((ack.node_index, format!("Unknown node (cluster size {})", cluster_size))),
        }
        if let Some(msg) = &ack.error {
            error!("Stage {} failed on node {} ({}): {}", stage, ack.node_index, ack.address, msg);
            errors.push((ack.node_index, msg.clone()));
        }
    }
    for (node, s) in seen.iter().enumerate() {
        if !*s {
            errors.push((node, String::from("No acknowledgement")));
        }
    }

    let ok_acks = acks.iter().filter(|a| !a.is_error());
    let payload = match mode {
        MergeMode::PerNode => {
            let per_node = ok_acks
                .filter_map(|a| a.payload.clone().map(|p| (a.node_index, p)))
                .collect::<BTreeMap<_, _>>();
            if per_node.is_empty() { MergedPayload::Empty } else { MergedPayload::PerNode(per_node) }
        },
        MergeMode::Sum => {
            let mut total = 0;
            for a in ok_acks {
                match &a.payload {
                    Some(AckPayload::Total(n)) => total += n,
                    Some(other) => errors.push((a.node_index, format!("Cannot sum payload {:?}", other))),
                    None => {},
                }
            }
            MergedPayload::Total(total)
        },
    };

    StageOutcome {
        stage: stage.to_string(),
        success: errors.is_empty(),
        payload,
        errors,
    }
}

/// Values shared between stages for the whole benchmark run, keyed by name.
#[derive(Clone, Default)]
pub struct StateBag(Arc<Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>>);

impl StateBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Any + Send + Sync>(&self, key: &str, value: T) {
        if let Ok(mut map) = self.0.lock() {
            map.insert(key.to_string(), Arc::new(value));
        }
    }

    /// `None` if absent or stored with another type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.0.lock().ok()?.get(key)?.clone();
        value.downcast::<T>().ok()
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut map) = self.0.lock() {
            map.remove(key);
        }
    }
}

/// What a stage sees of the node it runs on.
pub struct NodeContext {
    pub node_index: usize,
    pub cluster_size: usize,
    pub address: String,
    pub backend: Arc<dyn Backend>,
    pub state: StateBag,
}

pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn merge_mode(&self) -> MergeMode {
        MergeMode::PerNode
    }

    fn execute_on_node(&self, ctx: &NodeContext) -> anyhow::Result<Option<AckPayload>>;

    fn reduce(&self, acks: &[Ack], cluster_size: usize) -> StageOutcome {
        reduce_acks(self.name(), self.merge_mode(), acks, cluster_size)
    }
}

fn panic_message(p: &(dyn Any + Send)) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic")
    }
}

/// Runs `stage` on this node. Errors and panics both become an error Ack; nothing escapes.
pub fn run_on_node(stage: &dyn Stage, ctx: &NodeContext) -> Ack {
    debug!("Running stage {} on node {}", stage.name(), ctx.node_index);
    match panic::catch_unwind(AssertUnwindSafe(|| stage.execute_on_node(ctx))) {
        Ok(Ok(payload)) => Ack::ok(ctx.node_index, &ctx.address, payload),
        Ok(Err(e)) => Ack::error(ctx.node_index, &ctx.address, format!("{:#}", e)),
        Err(p) => Ack::error(ctx.node_index, &ctx.address, format!("Stage panicked: {}", panic_message(p.as_ref()))),
    }
}
