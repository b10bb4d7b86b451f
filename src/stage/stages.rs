// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use anyhow::{anyhow, bail, Context};
use indexmap::IndexMap;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{config::{BankConfig, KeyspaceConfig, RequestConfig, StressorConfig}, keygen::KeySpacePartitioner, stressor::{populate_node, warmup_node, Stressor}, workload::{build_factory, BankContext}};

use super::{reduce_acks, Ack, AckPayload, MergeMode, MergedPayload, NodeContext, Stage, StageOutcome};

/// State bag key under which population leaves the partitioner it seeded with.
pub const PARTITIONER_KEY: &str = "partitioner";

/// Stress parameters that a published partitioner takes precedence over.
const KEYSPACE_SHAPE_PARAMETERS: &[&str] = &["number_of_keys", "number_of_nodes", "number_of_threads"];

fn default_seeding_threads() -> usize {
    4
}

/// Serialisable description of one stage, as it appears in the benchmark config and on the wire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "stage")]
pub enum StageSpec {
    Population {
        keyspace: KeyspaceConfig,
        #[serde(default = "default_seeding_threads")]
        num_threads: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
    Warmup {
        keyspace: KeyspaceConfig,
        #[serde(default = "default_seeding_threads")]
        num_threads: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
    Stress {
        keyspace: KeyspaceConfig,
        stressor: StressorConfig,
        workload: RequestConfig,
        /// Applied through the parameter table before the run.
        #[serde(default)]
        parameters: IndexMap<String, String>,
        #[serde(default)]
        destroy_after: bool,
    },
    BankPopulation {
        bank: BankConfig,
    },
    BankValidation {
        bank: BankConfig,
    },
    ClearBackend,
}

impl StageSpec {
    pub fn build(&self) -> Box<dyn Stage> {
        match self.clone() {
            StageSpec::Population { keyspace, num_threads, seed } => Box::new(PopulationStage { keyspace, num_threads, seed }),
            StageSpec::Warmup { keyspace, num_threads, seed } => Box::new(WarmupStage { keyspace, num_threads, seed }),
            StageSpec::Stress { keyspace, stressor, workload, parameters, destroy_after } => {
                Box::new(StressStage { keyspace, stressor, workload, parameters, destroy_after })
            },
            StageSpec::BankPopulation { bank } => Box::new(BankPopulationStage { bank }),
            StageSpec::BankValidation { bank } => Box::new(BankValidationStage { bank }),
            StageSpec::ClearBackend => Box::new(ClearBackendStage),
        }
    }

    pub fn name(&self) -> &'static str {
        self.build().name()
    }
}

/// The partitioner published by an earlier population, if it describes the same key count.
fn published_partitioner(ctx: &NodeContext, num_keys: u64) -> Option<KeySpacePartitioner> {
    let p = ctx.state.get::<KeySpacePartitioner>(PARTITIONER_KEY)?;
    if p.num_keys() == num_keys {
        Some(*p)
    } else {
        warn!("Ignoring published key space of {} keys, this stage wants {}", p.num_keys(), num_keys);
        None
    }
}

/// Seeds the node's slice of the key space and publishes the partitioner.
/// Fails cluster-wide unless the nodes together wrote exactly `num_keys` keys.
pub struct PopulationStage {
    pub keyspace: KeyspaceConfig,
    pub num_threads: usize,
    pub seed: Option<u64>,
}

impl Stage for PopulationStage {
    fn name(&self) -> &'static str {
        "population"
    }

    fn merge_mode(&self) -> MergeMode {
        MergeMode::Sum
    }

    fn execute_on_node(&self, ctx: &NodeContext) -> anyhow::Result<Option<AckPayload>> {
        let partitioner = KeySpacePartitioner::new(self.keyspace.num_keys, ctx.cluster_size, self.num_threads)
            .context("Building key space")?;
        let seed = self.seed.unwrap_or(0);
        let written = populate_node(ctx.backend.as_ref(), &partitioner, ctx.node_index, &self.keyspace, seed);
        ctx.state.put(PARTITIONER_KEY, partitioner);
        Ok(Some(AckPayload::Total(written as i64)))
    }

    fn reduce(&self, acks: &[Ack], cluster_size: usize) -> StageOutcome {
        let mut outcome = reduce_acks(self.name(), self.merge_mode(), acks, cluster_size);
        if outcome.success {
            if let MergedPayload::Total(total) = outcome.payload {
                if total != self.keyspace.num_keys as i64 {
                    outcome.success = false;
                    outcome.errors.push((0, format!("Cluster wrote {} keys, expected {}", total, self.keyspace.num_keys)));
                }
            }
        }
        outcome
    }
}

/// Touches every key the node owns, re-writing missing ones.
pub struct WarmupStage {
    pub keyspace: KeyspaceConfig,
    pub num_threads: usize,
    pub seed: Option<u64>,
}

impl Stage for WarmupStage {
    fn name(&self) -> &'static str {
        "warmup"
    }

    fn merge_mode(&self) -> MergeMode {
        MergeMode::Sum
    }

    fn execute_on_node(&self, ctx: &NodeContext) -> anyhow::Result<Option<AckPayload>> {
        let partitioner = match published_partitioner(ctx, self.keyspace.num_keys) {
            Some(p) => p,
            None => KeySpacePartitioner::new(self.keyspace.num_keys, ctx.cluster_size, self.num_threads)
                .context("Building key space")?,
        };
        let touched = warmup_node(ctx.backend.as_ref(), &partitioner, ctx.node_index, &self.keyspace, self.seed.unwrap_or(0));
        Ok(Some(AckPayload::Total(touched as i64)))
    }
}

/// The measured run. Each node answers with its stressor report.
pub struct StressStage {
    pub keyspace: KeyspaceConfig,
    pub stressor: StressorConfig,
    pub workload: RequestConfig,
    pub parameters: IndexMap<String, String>,
    pub destroy_after: bool,
}

impl Stage for StressStage {
    fn name(&self) -> &'static str {
        "stress"
    }

    fn execute_on_node(&self, ctx: &NodeContext) -> anyhow::Result<Option<AckPayload>> {
        let factory = build_factory(&self.workload).context("Building workload")?;
        let stressor = Stressor::new(ctx.node_index, ctx.cluster_size, &self.keyspace, &self.stressor, factory)
            .context("Building stressor")?;
        let published = published_partitioner(ctx, self.keyspace.num_keys);
        for (name, value) in &self.parameters {
            if published.is_some() && KEYSPACE_SHAPE_PARAMETERS.contains(&name.as_str()) {
                warn!("Parameter {}={} overridden by the populated key space", name, value);
            }
            if !stressor.set_parameter(name, value) {
                warn!("Parameter {}={} not applied", name, value);
            }
        }
        // Last, so parameters cannot reshape the seeded key space.
        if let Some(p) = published {
            stressor.adopt_partitioner(&p)?;
        }

        let report = stressor.stress(ctx.backend.as_ref())?;
        if self.destroy_after {
            stressor.destroy(ctx.backend.as_ref())?;
        }
        Ok(Some(AckPayload::Report(report)))
    }
}

/// Seeds the bank accounts. Only the coordinator writes; the rest acknowledge with 0.
pub struct BankPopulationStage {
    pub bank: BankConfig,
}

impl Stage for BankPopulationStage {
    fn name(&self) -> &'static str {
        "bank-population"
    }

    fn merge_mode(&self) -> MergeMode {
        MergeMode::Sum
    }

    fn execute_on_node(&self, ctx: &NodeContext) -> anyhow::Result<Option<AckPayload>> {
        if !ctx.backend.is_coordinator() {
            return Ok(Some(AckPayload::Total(0)));
        }
        let written = BankContext::new(&self.bank).populate(ctx.backend.as_ref());
        Ok(Some(AckPayload::Total(written as i64)))
    }

    fn reduce(&self, acks: &[Ack], cluster_size: usize) -> StageOutcome {
        let mut outcome = reduce_acks(self.name(), self.merge_mode(), acks, cluster_size);
        let expected = self.bank.num_accounts as i64 + 1;
        if outcome.success && outcome.payload != MergedPayload::Total(expected) {
            outcome.success = false;
            outcome.errors.push((0, format!("Expected exactly one node to seed {} accounts, got {:?}", expected, outcome.payload)));
        }
        outcome
    }
}

/// Every node sums all accounts in one transaction and must see the seeded total.
pub struct BankValidationStage {
    pub bank: BankConfig,
}

impl Stage for BankValidationStage {
    fn name(&self) -> &'static str {
        "bank-validation"
    }

    fn execute_on_node(&self, ctx: &NodeContext) -> anyhow::Result<Option<AckPayload>> {
        let bank = BankContext::new(&self.bank);
        let mut txn = ctx.backend.start_transaction().context("Starting transaction")?;
        let res = bank.check_all_accounts(txn.as_mut());
        txn.end(false).context("Ending read-only transaction")?;
        let total = res.context("Reading accounts")?;
        if total != bank.expected_total() {
            bail!("Accounts sum to {}, expected {}", total, bank.expected_total());
        }
        info!("Node {} sees the expected bank total {}", ctx.node_index, total);
        Ok(Some(AckPayload::Total(total)))
    }
}

pub struct ClearBackendStage;

impl Stage for ClearBackendStage {
    fn name(&self) -> &'static str {
        "clear-backend"
    }

    fn execute_on_node(&self, ctx: &NodeContext) -> anyhow::Result<Option<AckPayload>> {
        ctx.backend.empty().map_err(|e| anyhow!("Emptying backend: {}", e))?;
        ctx.state.remove(PARTITIONER_KEY);
        Ok(None)
    }
}
