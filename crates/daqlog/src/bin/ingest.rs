// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! daqlog-ingest - write telemetry readings into daily buckets.
//!
//! Usage:
//!   mosquitto_sub -v -t 'sensor/#' | daqlog-ingest --config /etc/daqlog/daqlog.toml
//!   daqlog-ingest --source poll --config /etc/daqlog/daqlog.toml

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use daqlog::{
    init_tracing, DaqConfig, Ingester, LineSource, PollSource, StopHandle, DEFAULT_CONFIG_PATH,
};
use std::io;
use std::path::PathBuf;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    /// `<topic> <payload>` lines on stdin
    Stdin,
    /// Every `[[poll]]` endpoint in the configuration
    Poll,
}

#[derive(Parser, Debug)]
#[command(name = "daqlog-ingest")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Partition telemetry readings into daily CSV buckets")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "DAQLOG_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Where readings come from
    #[arg(long, value_enum, default_value_t = Source::Stdin)]
    source: Source,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = DaqConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    init_tracing(&config.base_dir, "ingest", &args.log_level)
        .with_context(|| format!("Cannot write logs under {}", config.base_dir.display()))?;

    let stop = StopHandle::new();
    ctrlc_handler(stop.clone());

    match args.source {
        Source::Stdin => {
            let mut ingester = Ingester::from_config(&config).with_stop_handle(stop);
            let stdin = io::stdin();
            let mut source = LineSource::new(stdin.lock());
            ingester.run(&mut source).context("Reading stdin failed")?;
        }
        Source::Poll => run_polls(&config, stop)?,
    }

    Ok(())
}

/// One thread per `[[poll]]` section, all sharing `stop`.
fn run_polls(config: &DaqConfig, stop: StopHandle) -> Result<()> {
    if config.poll.is_empty() {
        bail!("No [[poll]] section in configuration");
    }

    let mut workers = Vec::with_capacity(config.poll.len());
    for poll in &config.poll {
        let mut source = PollSource::new(poll.clone())
            .with_context(|| format!("Cannot set up poll for '{}'", poll.variable))?
            .with_stop_handle(stop.clone());
        let mut ingester = Ingester::from_config(config).with_stop_handle(stop.clone());
        tracing::info!(
            variable = %poll.variable,
            interval_secs = poll.interval_secs,
            "Starting poll"
        );
        let worker = thread::Builder::new()
            .name(format!("poll-{}", source.variable()))
            .spawn(move || ingester.run(&mut source))
            .context("Failed to spawn poll thread")?;
        workers.push(worker);
    }

    for worker in workers {
        match worker.join() {
            Ok(result) => result.context("Poll source failed")?,
            Err(_) => bail!("Poll thread panicked"),
        }
    }
    Ok(())
}

fn ctrlc_handler(stop_handle: StopHandle) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        stop_handle.stop();
    });
}
