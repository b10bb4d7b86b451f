// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

//! Load generation: a pool of OS threads released together, bounded by one shared stop flag.

use std::{io::{Error, ErrorKind}, sync::{atomic::{AtomicBool, Ordering}, Arc, Barrier, Mutex, MutexGuard}, thread, time::Duration};

use log::{error, info, warn};

use crate::{backend::{Backend, BackendCapabilities}, config::{KeyspaceConfig, StressorConfig}, keygen::{KeySpacePartitioner, KeyspaceSnapshot, SharedKeyspace}, utils::{apply_parameter, AtomicStruct}, workload::TransactionWorkloadFactory};

mod stats;
pub use stats::*;

mod params;
pub use params::*;

mod worker;
pub use worker::*;

mod population;
pub use population::*;

#[cfg(test)]
mod tests;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StressorState {
    Idle,
    WarmingUp,
    Running,
    Stopped,
    ReportReady,
}

pub struct Stressor {
    node_index: usize,
    settings: Mutex<StressorSettings>,
    keyspace: SharedKeyspace,
    factory: Arc<dyn TransactionWorkloadFactory>,
    state: Mutex<StressorState>,
}

fn build_snapshot(settings: &StressorSettings) -> Result<KeyspaceSnapshot, Error> {
    Ok(KeyspaceSnapshot {
        partitioner: KeySpacePartitioner::new(settings.keyspace.num_keys, settings.num_nodes, settings.stressor.num_threads)?,
        locality_probability: settings.keyspace.locality_probability,
        no_contention: settings.keyspace.no_contention,
        value_size: settings.keyspace.value_size,
        bucket_prefix: settings.keyspace.bucket_prefix.clone(),
    })
}

impl Stressor {
    pub fn new(
        node_index: usize,
        num_nodes: usize,
        keyspace: &KeyspaceConfig,
        config: &StressorConfig,
        factory: Arc<dyn TransactionWorkloadFactory>,
    ) -> Result<Self, Error> {
        let settings = StressorSettings {
            num_nodes,
            keyspace: keyspace.clone(),
            stressor: config.clone(),
        };
        let snapshot = build_snapshot(&settings)?;
        Ok(Self {
            node_index,
            settings: Mutex::new(settings),
            keyspace: AtomicStruct::new(snapshot),
            factory,
            state: Mutex::new(StressorState::Idle),
        })
    }

    fn settings(&self) -> Result<MutexGuard<'_, StressorSettings>, Error> {
        self.settings.lock()
            .map_err(|_| Error::new(ErrorKind::Other, "Stressor settings lock poisoned"))
    }

    fn set_state(&self, state: StressorState) {
        if let Ok(mut s) = self.state.lock() {
            *s = state;
        }
    }

    pub fn state(&self) -> StressorState {
        match self.state.lock() {
            Ok(s) => *s,
            Err(_) => StressorState::Stopped,
        }
    }

    pub fn node_index(&self) -> usize {
        self.node_index
    }

    pub fn settings_snapshot(&self) -> Result<StressorSettings, Error> {
        Ok(self.settings()?.clone())
    }

    pub fn partitioner(&self) -> KeySpacePartitioner {
        self.keyspace.get().partitioner
    }

    /// Reuses the key space shape of an earlier population, so the run hits exactly the seeded keys.
    pub fn adopt_partitioner(&self, partitioner: &KeySpacePartitioner) -> Result<(), Error> {
        {
            let mut settings = self.settings()?;
            if settings.stressor.num_threads != partitioner.num_threads() {
                info!("Using {} threads to match the populated key space (configured {})",
                    partitioner.num_threads(), settings.stressor.num_threads);
            }
            settings.keyspace.num_keys = partitioner.num_keys();
            settings.num_nodes = partitioner.num_nodes();
            settings.stressor.num_threads = partitioner.num_threads();
        }
        self.recompute()
    }

    /// Stressor tunables first, then the workload factory's. Invalid values keep the old setting.
    pub fn set_parameter(&self, name: &str, value: &str) -> bool {
        let own = match self.settings() {
            Ok(mut settings) => apply_parameter(STRESSOR_PARAMETERS, &mut settings, name, value),
            Err(e) => {
                error!("Cannot set {}: {}", name, e);
                return false;
            }
        };
        match own {
            Some(true) => match self.recompute() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Parameter {} accepted but snapshot not rebuilt: {}", name, e);
                    false
                }
            },
            Some(false) => false,
            None => match self.factory.set_parameter(name, value) {
                Some(ok) => ok,
                None => {
                    warn!("Unknown parameter {}", name);
                    false
                }
            },
        }
    }

    /// Rebuilds the key space snapshot and the factory's workload, and publishes both.
    pub fn recompute(&self) -> Result<(), Error> {
        let snapshot = build_snapshot(&*self.settings()?)?;
        self.keyspace.set(snapshot);
        self.factory.recompute();
        Ok(())
    }

    /// One full stress run against `backend`: optional warmup, then the measured run.
    pub fn stress(&self, backend: &dyn Backend) -> Result<Report, Error> {
        self.recompute()?;
        let settings = self.settings_snapshot()?;
        let caps = BackendCapabilities::of(backend);
        let seed = settings.stressor.seed.unwrap_or_else(rand::random::<u64>);

        let warmup = Duration::from_millis(settings.stressor.warmup_time_ms);
        if !warmup.is_zero() {
            self.set_state(StressorState::WarmingUp);
            info!("Warming up for {:?}", warmup);
            let stats = self.run_phase(backend, &settings, caps, warmup, seed.rotate_left(7));
            info!("Warmup done, discarding {} committed transactions", stats.committed());
        }

        self.set_state(StressorState::Running);
        let run = Duration::from_millis(settings.stressor.simulation_time_ms);
        info!("Stressing node {} with {} threads for {:?} using the {} workload",
            self.node_index, settings.stressor.num_threads, run, self.factory.name());
        let stats = self.run_phase(backend, &settings, caps, run, seed);
        self.set_state(StressorState::Stopped);

        let report = stats.report(backend.additional_stats());
        info!("Node {} done: {} committed, {} failed, {:.2} tx/s",
            self.node_index, stats.committed(), stats.failures(), stats.throughput());
        self.set_state(StressorState::ReportReady);
        Ok(report)
    }

    fn run_phase(&self, backend: &dyn Backend, settings: &StressorSettings, caps: BackendCapabilities, duration: Duration, seed: u64) -> ThreadStats {
        let num_threads = settings.stressor.num_threads;
        let barrier = Barrier::new(num_threads + 1);
        let stop = AtomicBool::new(false);
        let generate_load = settings.stressor.coordinator_participation || !caps.is_coordinator;
        let cores = if settings.stressor.pin_threads {
            core_affinity::get_core_ids().unwrap_or_default()
        } else {
            Vec::new()
        };

        thread::scope(|s| {
            let handles = (0..num_threads).map(|t| {
                let task = WorkerTask {
                    node_index: self.node_index,
                    thread_index: t,
                    seed: thread_seed(seed, self.node_index, t),
                    backend,
                    caps,
                    factory: self.factory.clone(),
                    keyspace: self.keyspace.clone(),
                    barrier: &barrier,
                    stop: &stop,
                    generate_load,
                    core: if cores.is_empty() { None } else { Some(cores[t % cores.len()]) },
                };
                s.spawn(move || run_worker(task))
            }).collect::<Vec<_>>();

            // A zero-length run stops before anyone starts.
            if duration.is_zero() {
                stop.store(true, Ordering::Release);
            }
            barrier.wait();
            if !duration.is_zero() {
                if let Err(e) = crossbeam::channel::after(duration).recv() {
                    warn!("Run timer failed ({}), stopping now", e);
                }
                stop.store(true, Ordering::Release);
            }

            let mut total = ThreadStats::default();
            for h in handles {
                match h.join() {
                    Ok(stats) => total.merge(&stats),
                    Err(_) => error!("Worker thread panicked; its statistics are lost"),
                }
            }
            total
        })
    }

    /// Drops everything the run wrote.
    pub fn destroy(&self, backend: &dyn Backend) -> Result<(), Error> {
        backend.empty()?;
        self.set_state(StressorState::Idle);
        info!("Node {} cleared backend", self.node_index);
        Ok(())
    }
}
