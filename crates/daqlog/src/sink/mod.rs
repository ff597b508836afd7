// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery sinks: where closed-bucket archives are sent.
//!
//! A sink reports one boolean per destination and never returns an error;
//! failures are logged by the sink and surface as `false`.

mod ftp;
mod telegram;

pub use ftp::{FtpError, FtpSink};
pub use telegram::TelegramSink;

use crate::archive::Artifact;
use crate::config::DaqConfig;
use crate::period::PeriodKey;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Metadata sent along with an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMeta {
    pub period: PeriodKey,
    pub size_bytes: u64,
    /// Deployment tag (region, site).
    pub label: Option<String>,
}

impl ArtifactMeta {
    pub fn new(artifact: &Artifact, label: Option<String>) -> Self {
        Self {
            period: artifact.period,
            size_bytes: artifact.size_bytes,
            label,
        }
    }

    /// Size in kilobytes, one decimal.
    pub fn size_kb(&self) -> String {
        format!("{:.1} KB", self.size_bytes as f64 / 1024.0)
    }

    /// Human-readable caption stating period and size.
    pub fn caption(&self) -> String {
        let mut caption = String::new();
        if let Some(label) = &self.label {
            caption.push_str(&format!("[{}] ", label));
        }
        caption.push_str(&format!(
            "{} IoT report\nPeriod: {}\nSize: {}",
            self.period.granularity().report_name(),
            self.period,
            self.size_kb()
        ));
        caption
    }
}

/// Per-destination delivery results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    results: BTreeMap<String, bool>,
}

impl DeliveryReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, destination: impl Into<String>, success: bool) {
        self.results.insert(destination.into(), success);
    }

    pub fn merge(&mut self, other: DeliveryReport) {
        self.results.extend(other.results);
    }

    /// At least one destination acknowledged receipt.
    pub fn any_success(&self) -> bool {
        self.results.values().any(|ok| *ok)
    }

    pub fn successes(&self) -> usize {
        self.results.values().filter(|ok| **ok).count()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, destination: &str) -> Option<bool> {
        self.results.get(destination).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.results.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Something that can carry an artifact to one or more destinations.
pub trait DeliverySink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Send the artifact to every destination of this sink.
    fn send(&self, artifact: &Path, meta: &ArtifactMeta) -> DeliveryReport;

    /// Best-effort text alert. Errors are swallowed.
    fn alert(&self, _text: &str) {}
}

/// Fan-out over all configured sinks.
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn DeliverySink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn DeliverySink>) {
        self.sinks.push(sink);
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Send through every sink and merge the reports.
    pub fn send(&self, artifact: &Path, meta: &ArtifactMeta) -> DeliveryReport {
        let mut report = DeliveryReport::new();
        for sink in &self.sinks {
            tracing::debug!(sink = sink.name(), period = %meta.period, "Sending artifact");
            report.merge(sink.send(artifact, meta));
        }
        report
    }

    /// Alert through every sink.
    pub fn alert(&self, text: &str) {
        for sink in &self.sinks {
            sink.alert(text);
        }
    }
}

/// Build the sinks named in the configuration.
pub fn create_sinks(config: &DaqConfig) -> SinkSet {
    let mut sinks = SinkSet::new();
    if let Some(telegram) = &config.telegram {
        sinks.push(Arc::new(TelegramSink::new(telegram.clone(), config.label.clone())));
    }
    for ftp in &config.ftp {
        sinks.push(Arc::new(FtpSink::new(ftp.clone())));
    }
    sinks
}
