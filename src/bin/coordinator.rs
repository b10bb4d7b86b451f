// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::{fs, io, process};

use clap::{arg, command};
use distbench::{config::{default_log4rs_config, BenchmarkConfig}, coordinator::Coordinator};
use log::{error, info};
use tokio::runtime;

fn load_config(path: &str) -> io::Result<BenchmarkConfig> {
    let contents = fs::read_to_string(path)?;
    BenchmarkConfig::deserialize(&contents)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn run_main(config: BenchmarkConfig, keep_nodes: bool) -> bool {
    let coordinator = Coordinator::connect(config);
    info!("Driving {} remote nodes", coordinator.cluster_size());
    let outcomes = coordinator.run().await;
    if !keep_nodes {
        coordinator.shutdown().await;
    }

    for outcome in &outcomes {
        info!("{}", outcome);
        if let Ok(s) = serde_json::to_string(&outcome.payload) {
            info!("{} payload: {}", outcome.stage, s);
        }
    }
    outcomes.iter().all(|o| o.success)
}

fn main() {
    log4rs::init_config(default_log4rs_config()).unwrap();
    let matches = command!()
        .about("Runs a benchmark against nodes started with the node binary")
        .arg(arg!(<config_path> "Path to benchmark config"))
        .arg(arg!(--keep "Leave the nodes running afterwards"))
        .get_matches();

    let config_path = matches.get_one::<String>("config_path").cloned().unwrap_or_default();
    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("Cannot load {}: {}", config_path, e);
            process::exit(2);
        }
    };

    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    if !runtime.block_on(run_main(config, matches.get_flag("keep"))) {
        error!("Benchmark finished with failed stages");
        process::exit(1);
    }
}
