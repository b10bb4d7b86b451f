// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the MIT License.

use std::{fs, io, process};

use clap::{arg, command};
use distbench::{config::{default_log4rs_config, BenchmarkConfig}, coordinator::Coordinator};
use log::{error, info};
use tokio::runtime;

struct Args {
    config_path: String,
    output_path: Option<String>,
}

fn parse_args() -> Args {
    let matches = command!()
        .about("Runs a whole benchmark cluster inside this process")
        .arg(arg!(<config_path> "Path to benchmark config"))
        .arg(arg!(-o --output <PATH> "Write stage outcomes as JSON").required(false))
        .get_matches();

    Args {
        config_path: matches.get_one::<String>("config_path").cloned().unwrap_or_default(),
        output_path: matches.get_one::<String>("output").cloned(),
    }
}

fn load_config(path: &str) -> io::Result<BenchmarkConfig> {
    let contents = fs::read_to_string(path)?;
    BenchmarkConfig::deserialize(&contents)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn run_main(config: BenchmarkConfig, output_path: Option<String>) -> io::Result<bool> {
    let coordinator = Coordinator::local_cluster(config)?;
    let outcomes = coordinator.run().await;
    coordinator.shutdown().await;

    for outcome in &outcomes {
        info!("{}", outcome);
    }
    if let Some(path) = output_path {
        let json = serde_json::to_string_pretty(&outcomes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&path, json)?;
        info!("Stage outcomes written to {}", path);
    }
    Ok(outcomes.iter().all(|o| o.success))
}

fn main() {
    log4rs::init_config(default_log4rs_config()).unwrap();
    let args = parse_args();

    let config = match load_config(&args.config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("Cannot load {}: {}", args.config_path, e);
            process::exit(2);
        }
    };

    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    match runtime.block_on(run_main(config, args.output_path)) {
        Ok(true) => info!("Benchmark finished"),
        Ok(false) => {
            error!("Benchmark finished with failed stages");
            process::exit(1);
        },
        Err(e) => {
            error!("Benchmark aborted: {}", e);
            process::exit(1);
        }
    }
}
