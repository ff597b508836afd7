// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deployment configuration.
//!
//! One TOML document is read at startup into a [`DaqConfig`] and handed to
//! each component. Nothing below the binaries looks up paths or credentials
//! on its own.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest health probe; the gate must answer in single-digit seconds.
const MAX_PROBE_TIMEOUT_SECS: u64 = 9;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaqConfig {
    /// Root of the partitioned layout (`<base>/<YYYY_MM_DD>/...`).
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Deployment tag prefixed to captions and alerts (e.g. a region code).
    #[serde(default)]
    pub label: Option<String>,

    /// Minutes past midnight at which the previous day is considered closed.
    #[serde(default = "default_offset_minutes")]
    pub daily_offset_minutes: u32,

    /// Deliver the previous month's bucket on the 1st of each month.
    #[serde(default = "default_true")]
    pub monthly_delivery: bool,

    /// Alert destinations when a day produced no local data.
    #[serde(default = "default_true")]
    pub notify_missing: bool,

    /// Remove a day's data files once its archive was delivered.
    #[serde(default)]
    pub purge_after_delivery: bool,

    /// File suffixes marking in-progress files that must not be archived.
    #[serde(default = "default_lock_suffixes")]
    pub lock_suffixes: Vec<String>,

    /// Pre-flight reachability probe.
    #[serde(default)]
    pub health: HealthConfig,

    /// Telegram bot delivery.
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,

    /// FTP delivery targets.
    #[serde(default)]
    pub ftp: Vec<FtpConfig>,

    /// Known variables: CSV header and MQTT topic.
    #[serde(default)]
    pub variables: Vec<VariableConfig>,

    /// HTTP endpoints sampled on an interval.
    #[serde(default)]
    pub poll: Vec<PollConfig>,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("/home/log")
}

fn default_offset_minutes() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_lock_suffixes() -> Vec<String> {
    vec![".lock".to_string()]
}

impl Default for DaqConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            label: None,
            daily_offset_minutes: default_offset_minutes(),
            monthly_delivery: true,
            notify_missing: true,
            purge_after_delivery: false,
            lock_suffixes: default_lock_suffixes(),
            health: HealthConfig::default(),
            telegram: None,
            ftp: Vec::new(),
            variables: Vec::new(),
            poll: Vec::new(),
        }
    }
}

impl DaqConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("base_dir is empty".into()));
        }

        if self.daily_offset_minutes == 0 || self.daily_offset_minutes >= 24 * 60 {
            return Err(ConfigError::Invalid(format!(
                "daily_offset_minutes must be between 1 and 1439, got {}",
                self.daily_offset_minutes
            )));
        }

        if self.health.timeout_secs == 0 || self.health.timeout_secs > MAX_PROBE_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "health.timeout_secs must be between 1 and {}, got {}",
                MAX_PROBE_TIMEOUT_SECS, self.health.timeout_secs
            )));
        }

        if let Some(telegram) = &self.telegram {
            if telegram.token.trim().is_empty() {
                return Err(ConfigError::Invalid("telegram.token is empty".into()));
            }
            if telegram.chat_ids.is_empty() {
                return Err(ConfigError::Invalid("telegram.chat_ids is empty".into()));
            }
            let mut chats = HashSet::new();
            for chat_id in &telegram.chat_ids {
                if !chats.insert(chat_id.trim()) {
                    return Err(ConfigError::Invalid(format!(
                        "telegram chat '{}' listed twice",
                        chat_id
                    )));
                }
            }
        }

        let mut servers = HashSet::new();
        for (i, ftp) in self.ftp.iter().enumerate() {
            if ftp.host.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("ftp[{}] has empty host", i)));
            }
            if !servers.insert((ftp.host.trim(), ftp.remote_dir.as_str())) {
                return Err(ConfigError::Invalid(format!(
                    "ftp[{}] duplicates {}{}",
                    i, ftp.host, ftp.remote_dir
                )));
            }
        }

        let mut seen = HashSet::new();
        for var in &self.variables {
            check_variable_name(&var.name)?;
            if !seen.insert(var.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "variable '{}' declared twice",
                    var.name
                )));
            }
        }

        let mut polled = HashSet::new();
        for (i, poll) in self.poll.iter().enumerate() {
            check_variable_name(&poll.variable)?;
            if !polled.insert(poll.variable.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "variable '{}' polled twice",
                    poll.variable
                )));
            }
            if poll.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("poll[{}] has empty url", i)));
            }
            if poll.fields.is_empty() {
                return Err(ConfigError::Invalid(format!("poll[{}] has no fields", i)));
            }
            if poll.interval_secs == 0 || poll.timeout_secs == 0 {
                return Err(ConfigError::Invalid(format!(
                    "poll[{}] interval_secs and timeout_secs must be > 0",
                    i
                )));
            }
        }

        Ok(())
    }

    /// Offset past midnight for the daily boundary.
    pub fn daily_offset(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.daily_offset_minutes))
    }

    /// Header row per variable name.
    pub fn header_catalog(&self) -> HashMap<String, Vec<String>> {
        self.variables
            .iter()
            .filter(|v| !v.header.is_empty())
            .map(|v| (v.name.clone(), v.header.clone()))
            .collect()
    }

    /// Whether at least one delivery destination is configured.
    pub fn has_destinations(&self) -> bool {
        self.telegram.is_some() || !self.ftp.is_empty()
    }
}

/// Variable names become file names inside a bucket.
fn check_variable_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(ConfigError::Invalid(format!("invalid variable name '{}'", name)));
    }
    Ok(())
}

/// Probe flavour for the health gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// TCP connect to `host:port`.
    #[default]
    Tcp,
    /// HTTP GET expecting a fixed status code.
    Http,
    /// Always reachable.
    Disabled,
}

/// Health gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub probe: ProbeKind,

    /// `host:port` for TCP probes, a URL for HTTP probes.
    #[serde(default = "default_probe_target")]
    pub target: String,

    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,

    /// Status an HTTP probe must see (204 rules out captive portals).
    #[serde(default = "default_expect_status")]
    pub expect_status: u16,
}

fn default_probe_target() -> String {
    "api.telegram.org:443".to_string()
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_expect_status() -> u16 {
    204
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe: ProbeKind::Tcp,
            target: default_probe_target(),
            timeout_secs: default_probe_timeout(),
            expect_status: default_expect_status(),
        }
    }
}

/// Telegram bot destination set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub token: String,

    /// Chats that receive every artifact.
    pub chat_ids: Vec<String>,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,

    #[serde(default = "default_alert_timeout")]
    pub alert_timeout_secs: u64,

    /// Skip TLS certificate verification (networks that intercept TLS).
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_upload_timeout() -> u64 {
    60
}

fn default_alert_timeout() -> u64 {
    10
}

/// One FTP server destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpConfig {
    pub host: String,

    #[serde(default = "default_ftp_port")]
    pub port: u16,

    #[serde(default = "default_ftp_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Remote directory under which `<period>/` directories are created.
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    #[serde(default = "default_ftp_timeout")]
    pub timeout_secs: u64,
}

fn default_ftp_port() -> u16 {
    21
}

fn default_ftp_user() -> String {
    "anonymous".to_string()
}

fn default_remote_dir() -> String {
    "/".to_string()
}

fn default_ftp_timeout() -> u64 {
    30
}

/// A logged variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableConfig {
    /// Variable name, used in `<period>_<name>.csv`.
    pub name: String,

    /// Source topic (e.g. `measure/temperature`).
    #[serde(default)]
    pub topic: Option<String>,

    /// CSV header row, including the leading time column.
    #[serde(default)]
    pub header: Vec<String>,
}

/// An HTTP JSON endpoint sampled every `interval_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Variable the samples are stored under.
    pub variable: String,

    pub url: String,

    /// JSON pointers (`/main/temp`), one per CSV field, in column order.
    pub fields: Vec<String>,

    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,
}

impl PollConfig {
    /// Routing topic for this poll's readings.
    pub fn topic(&self) -> String {
        format!("poll/{}", self.variable)
    }
}

fn default_poll_interval() -> u64 {
    900
}

fn default_poll_timeout() -> u64 {
    10
}
