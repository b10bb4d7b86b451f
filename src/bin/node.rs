// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::{fs, io, process, sync::{atomic::{AtomicUsize, Ordering}, Arc}};

use clap::{arg, command, value_parser};
use distbench::{backend::{Backend, MemoryBackend}, config::{default_log4rs_config, BackendConfig, NodeConfig}, coordinator::NodeServer, stage::{NodeContext, StateBag}};
use log::{debug, error, info};
use tokio::runtime;

struct Args {
    config_path: String,
    num_threads: usize,
    pin_threads: bool,
}

fn parse_args() -> Args {
    let matches = command!()
        .about("One benchmark node, driven over TCP by the coordinator")
        .arg(arg!(<config_path> "Path to node config"))
        .arg(arg!(-t --threads <N> "Async runtime worker threads")
            .value_parser(value_parser!(usize))
            .default_value("2"))
        .arg(arg!(--pin "Pin runtime threads to cores"))
        .get_matches();

    Args {
        config_path: matches.get_one::<String>("config_path").cloned().unwrap_or_default(),
        num_threads: matches.get_one::<usize>("threads").copied().unwrap_or(2),
        pin_threads: matches.get_flag("pin"),
    }
}

fn load_config(path: &str) -> io::Result<NodeConfig> {
    let contents = fs::read_to_string(path)?;
    NodeConfig::deserialize(&contents)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn make_backend(cfg: &NodeConfig) -> io::Result<Arc<dyn Backend>> {
    let backend = match &cfg.backend {
        BackendConfig::Memory(_) => MemoryBackend::new(),
    };
    backend.set_up(&cfg.backend, cfg.node_index)?;
    Ok(Arc::new(backend))
}

async fn run_main(cfg: NodeConfig) -> io::Result<()> {
    let ctx = NodeContext {
        node_index: cfg.node_index,
        cluster_size: cfg.cluster_size,
        address: cfg.addr.clone(),
        backend: make_backend(&cfg)?,
        state: StateBag::new(),
    };
    let backend = ctx.backend.clone();
    let server = NodeServer::new(ctx, cfg.recv_buffer_size);
    let listener = server.bind().await?;
    server.run(listener).await?;
    backend.tear_down()
}

fn main() {
    log4rs::init_config(default_log4rs_config()).unwrap();
    let args = parse_args();

    let cfg = match load_config(&args.config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("Cannot load {}: {}", args.config_path, e);
            process::exit(2);
        }
    };
    info!("Starting node {} of {} on {}", cfg.node_index, cfg.cluster_size, cfg.addr);

    let core_ids = if args.pin_threads {
        core_affinity::get_core_ids().unwrap_or_default()
    } else {
        Vec::new()
    };
    let next_core = AtomicUsize::new(0);
    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(args.num_threads.max(1))
        .on_thread_start(move || {
            if core_ids.is_empty() {
                return;
            }
            let id = next_core.fetch_add(1, Ordering::SeqCst) % core_ids.len();
            if core_affinity::set_for_current(core_ids[id]) {
                debug!("Thread pinned to core {:?}", id);
            } else {
                debug!("Thread pinning to core {:?} failed", id);
            }
        })
        .build()
        .unwrap();

    if let Err(e) = runtime.block_on(run_main(cfg)) {
        error!("Node stopped: {}", e);
        process::exit(1);
    }
}
