// Copyright (c) Shubham Mishra. All rights reserved.
// Licensed under the Apache 2.0 License.


use std::env;

use log::LevelFilter;
use log4rs::{append::{console::ConsoleAppender, file::FileAppender}, config::{Appender, Root}, encode::pattern::PatternEncoder, Config};

const LOG_PATTERN: &str = "{h([{l}][{M}][{d}])} {m}{n}";     // [INFO][module][timestamp] message

fn level_from_env() -> LevelFilter {
    match env::var("LOG_LEVEL").unwrap_or(String::from("info")).as_str() {
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info
    }
}

/// Console logging, plus a file appender when `LOG_FILE` names a writable path.
pub fn default_log4rs_config() -> Config {
    let level = level_from_env();
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let mut builder = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)));
    let mut root = Root::builder().appender("stdout");

    if let Ok(path) = env::var("LOG_FILE") {
        match FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build(&path)
        {
            Ok(file) => {
                builder = builder.appender(Appender::builder().build("file", Box::new(file)));
                root = root.appender("file");
            },
            Err(e) => eprintln!("Cannot open log file {}: {}", path, e),
        }
    }

    builder
        .build(root.build(level))
        .expect("Static log4rs config")
}
