// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! daqlog: date-partitioned telemetry logging and scheduled delivery
//!
//! Telemetry readings are written to one CSV file per variable and day. Shortly
//! after midnight the day that just closed is zipped and delivered to FTP
//! servers and Telegram chats; on the 1st of a month the previous month's
//! bucket follows.
//!
//! # Features
//!
//! - **Partition Store**: `<base>/<YYYY_MM_DD>/<YYYY_MM_DD>_<variable>.csv`, header once
//! - **Sources**: `<topic> <payload>` lines from a subscriber, or an HTTP JSON endpoint polled on an interval
//! - **Bucket Archiver**: `<base>/<period>.zip`, lock files skipped
//! - **Delivery Scheduler**: daily boundary at midnight plus a configurable offset
//! - **Health Gate**: TCP or HTTP reachability probe before any upload
//! - **Sinks**: Telegram Bot API and FTP, artifact removed once any destination acknowledges
//!
//! # Layout
//!
//! ```text
//! /home/log/
//! ├── 2025_11/uploader.log          # operational log
//! ├── 2025_11_25/
//! │   ├── 2025_11_25_temperature.csv
//! │   └── 2025_11_25_humidity.csv
//! └── 2025_11_25.zip                # pending artifact
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use daqlog::{DaqConfig, DeliveryScheduler};
//!
//! let config = DaqConfig::from_file("/etc/daqlog/daqlog.toml")?;
//! let scheduler = DeliveryScheduler::from_config(&config);
//! scheduler.run();
//! ```

pub mod archive;
pub mod config;
pub mod health;
pub mod ingest;
pub mod oplog;
pub mod period;
pub mod pipeline;
pub mod poll;
pub mod schedule;
pub mod sink;
pub mod store;

pub use archive::{ArchiveError, Artifact, BucketArchiver};
pub use config::{
    ConfigError, DaqConfig, FtpConfig, HealthConfig, PollConfig, TelegramConfig, VariableConfig,
};
pub use health::{create_gate, AlwaysReachable, HealthGate, HttpProbe, TcpProbe};
pub use ingest::{IngestStats, Ingester, LineSource, Reading, ReadingSource, TopicMap};
pub use oplog::{init_tracing, MonthlyLog};
pub use period::{Granularity, PeriodKey};
pub use pipeline::{DeliveryPipeline, Outcome, PipelineError};
pub use poll::{PollError, PollSource};
pub use schedule::{next_wake, Clock, CycleReport, DeliveryScheduler, StopHandle, SystemClock};
pub use sink::{create_sinks, ArtifactMeta, DeliveryReport, DeliverySink, SinkSet};
pub use store::{PartitionStore, Record, StoreError};

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/daqlog/daqlog.toml";
