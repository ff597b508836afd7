// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! daqlog-resend - deliver explicit periods now.
//!
//! Usage:
//!   daqlog-resend 2025_11_24 2025_11_25
//!   daqlog-resend 2025_10

use anyhow::{bail, Context, Result};
use clap::Parser;
use daqlog::{init_tracing, DaqConfig, DeliveryPipeline, PeriodKey, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "daqlog-resend")]
#[command(author = "naskel.com")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Archive and deliver the given day or month buckets immediately")]
struct Args {
    /// Period keys (YYYY_MM_DD or YYYY_MM)
    #[arg(required = true)]
    periods: Vec<PeriodKey>,

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
    init_tracing(&config.base_dir, "resend", &args.log_level)
        .with_context(|| format!("Cannot write logs under {}", config.base_dir.display()))?;

    let pipeline = DeliveryPipeline::from_config(&config);
    let mut failed = 0;

    for period in &args.periods {
        match pipeline.deliver_guarded(period) {
            Ok(outcome) => {
                println!("{}: {}", period, outcome);
                if !outcome.is_delivered() {
                    failed += 1;
                }
            }
            Err(e) => {
                println!("{}: error: {}", period, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} periods not delivered", failed, args.periods.len());
    }
    Ok(())
}
