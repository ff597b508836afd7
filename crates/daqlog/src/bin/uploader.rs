// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! daqlog-uploader - deliver each closed day (and month) after midnight.
//!
//! Usage:
//!   daqlog-uploader --config /etc/daqlog/daqlog.toml
//!   daqlog-uploader --log-level debug

use anyhow::{Context, Result};
use clap::Parser;
use daqlog::{
    create_gate, init_tracing, sink::TelegramSink, DaqConfig, DeliveryScheduler, StopHandle,
    DEFAULT_CONFIG_PATH,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "daqlog-uploader")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Archive and deliver closed telemetry buckets on a daily schedule")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "DAQLOG_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = DaqConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let log_path = init_tracing(&config.base_dir, "uploader", &args.log_level)
        .with_context(|| format!("Cannot write logs under {}", config.base_dir.display()))?;

    tracing::info!(
        config = %args.config.display(),
        base_dir = %config.base_dir.display(),
        log = %log_path.display(),
        "Starting daqlog uploader"
    );

    if !config.has_destinations() {
        tracing::warn!("No delivery destination configured; artifacts will be kept");
    }
    if !create_gate(&config.health).is_reachable() {
        tracing::warn!("Network unreachable at startup");
    } else if let Some(telegram) = &config.telegram {
        TelegramSink::new(telegram.clone(), config.label.clone()).check();
    }

    let scheduler = DeliveryScheduler::from_config(&config);
    tracing::info!(next_wake = %scheduler.next_wake(), "Scheduler ready");

    ctrlc_handler(scheduler.stop_handle());
    scheduler.run();

    Ok(())
}

fn ctrlc_handler(stop_handle: StopHandle) {
    let _ = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, shutting down...");
        stop_handle.stop();
    });
}
