// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::{io, sync::Arc};

use futures::future::join_all;
use log::{error, info, warn};

use crate::{backend::{Backend, MemoryBackend, MemoryStore}, config::{BackendConfig, BenchmarkConfig}, stage::{run_on_node, Ack, NodeContext, StageOutcome, StageSpec, StateBag}};

mod net;
pub use net::*;

#[cfg(test)]
mod tests;

/// A node living in this process. Stages run on the blocking pool.
pub struct LocalNode {
    ctx: Arc<NodeContext>,
}

impl LocalNode {
    pub fn new(ctx: NodeContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    pub async fn run_stage(&self, spec: &StageSpec) -> Ack {
        let ctx = self.ctx.clone();
        let spec = spec.clone();
        match tokio::task::spawn_blocking(move || run_on_node(spec.build().as_ref(), &ctx)).await {
            Ok(ack) => ack,
            Err(e) => Ack::error(self.ctx.node_index, &self.ctx.address, format!("Stage task failed: {}", e)),
        }
    }
}

pub enum NodeHandle {
    Local(LocalNode),
    Remote(RemoteNode),
}

impl NodeHandle {
    pub async fn run_stage(&self, spec: &StageSpec) -> Ack {
        match self {
            NodeHandle::Local(n) => n.run_stage(spec).await,
            NodeHandle::Remote(n) => n.run_stage(spec).await,
        }
    }

    pub async fn shutdown(&self) -> io::Result<()> {
        match self {
            NodeHandle::Local(n) => n.ctx.backend.tear_down(),
            NodeHandle::Remote(n) => n.shutdown().await,
        }
    }
}

/// Runs a benchmark's stages in order. Every stage goes to all nodes at once;
/// the next stage starts only after every node has acknowledged.
pub struct Coordinator {
    config: BenchmarkConfig,
    nodes: Vec<NodeHandle>,
}

/// Builds the per-node backend of an in-process cluster. All nodes share one store.
pub fn local_backend(config: &BackendConfig, store: &Arc<MemoryStore>, node_index: usize) -> io::Result<Arc<dyn Backend>> {
    let backend = match config {
        BackendConfig::Memory(_) => MemoryBackend::attach(store.clone()),
    };
    backend.set_up(config, node_index)?;
    Ok(Arc::new(backend))
}

impl Coordinator {
    pub fn new(config: BenchmarkConfig, nodes: Vec<NodeHandle>) -> Self {
        Self { config, nodes }
    }

    /// Every node of `config.cluster` simulated inside this process.
    pub fn local_cluster(config: BenchmarkConfig) -> io::Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let size = config.cluster.nodes.len();
        let mut nodes = Vec::with_capacity(size);
        for (i, info) in config.cluster.nodes.iter().enumerate() {
            nodes.push(NodeHandle::Local(LocalNode::new(NodeContext {
                node_index: i,
                cluster_size: size,
                address: info.addr.clone(),
                backend: local_backend(&config.backend, &store, i)?,
                state: StateBag::new(),
            })));
        }
        info!("Built local cluster of {} nodes", size);
        Ok(Self::new(config, nodes))
    }

    /// Every node of `config.cluster` reached over TCP.
    pub fn connect(config: BenchmarkConfig) -> Self {
        let nodes = config.cluster.nodes.iter().enumerate()
            .map(|(i, info)| NodeHandle::Remote(RemoteNode::new(
                i, &info.addr, config.cluster.connect_max_retry, config.cluster.recv_buffer_size)))
            .collect();
        Self::new(config, nodes)
    }

    pub fn cluster_size(&self) -> usize {
        self.nodes.len()
    }

    pub async fn run_stage(&self, spec: &StageSpec) -> StageOutcome {
        let stage = spec.build();
        info!("Starting stage {} on {} nodes", stage.name(), self.nodes.len());
        let acks = join_all(self.nodes.iter().map(|n| n.run_stage(spec))).await;
        let outcome = stage.reduce(&acks, self.nodes.len());
        if outcome.success {
            info!("Stage {} succeeded", outcome.stage);
        } else {
            error!("{}", outcome);
        }
        outcome
    }

    /// All configured stages in order. With `abort_on_failure`, stops after the first failed one.
    pub async fn run(&self) -> Vec<StageOutcome> {
        let mut outcomes = Vec::with_capacity(self.config.stages.len());
        for spec in &self.config.stages {
            let outcome = self.run_stage(spec).await;
            let failed = !outcome.success;
            outcomes.push(outcome);
            if failed && self.config.abort_on_failure {
                warn!("Aborting benchmark after failed stage");
                break;
            }
        }
        outcomes
    }

    pub async fn shutdown(&self) {
        let results = join_all(self.nodes.iter().map(|n| n.shutdown())).await;
        for (i, r) in results.into_iter().enumerate() {
            if let Err(e) = r {
                warn!("Node {} did not shut down cleanly: {}", i, e);
            }
        }
    }
}
