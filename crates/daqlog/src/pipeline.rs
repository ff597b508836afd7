// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery pipeline: archive one closed period, gate, send, clean up.

use crate::archive::{ArchiveError, Artifact, BucketArchiver};
use crate::config::DaqConfig;
use crate::health::{create_gate, HealthGate};
use crate::period::{Granularity, PeriodKey};
use crate::sink::{create_sinks, ArtifactMeta, DeliveryReport, SinkSet};
use std::any::Any;
use std::fmt;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("failed to remove {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("delivery panicked: {0}")]
    Panicked(String),
}

/// What happened to one period.
#[derive(Debug)]
pub enum Outcome {
    /// The bucket directory does not exist.
    NoBucket,
    /// The bucket exists but holds nothing to ship.
    Empty,
    /// Health gate closed; the artifact stays on disk.
    Offline { artifact: Artifact },
    /// At least one destination acknowledged; the artifact was removed.
    Delivered {
        artifact: Artifact,
        report: DeliveryReport,
    },
    /// Every destination failed; the artifact stays on disk.
    Failed {
        artifact: Artifact,
        report: DeliveryReport,
    },
}

impl Outcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered { .. })
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            Outcome::Offline { artifact }
            | Outcome::Delivered { artifact, .. }
            | Outcome::Failed { artifact, .. } => Some(artifact),
            Outcome::NoBucket | Outcome::Empty => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::NoBucket => write!(f, "no bucket"),
            Outcome::Empty => write!(f, "empty bucket"),
            Outcome::Offline { artifact } => {
                write!(f, "offline, kept {}", artifact.path.display())
            }
            Outcome::Delivered { report, .. } => {
                write!(f, "delivered ({}/{})", report.successes(), report.len())
            }
            Outcome::Failed { artifact, report } => write!(
                f,
                "failed ({} destinations), kept {}",
                report.len(),
                artifact.path.display()
            ),
        }
    }
}

/// One archive, gate, send and cleanup pass per period.
pub struct DeliveryPipeline {
    archiver: BucketArchiver,
    gate: Box<dyn HealthGate>,
    sinks: SinkSet,
    label: Option<String>,
    notify_missing: bool,
    purge_after_delivery: bool,
}

impl DeliveryPipeline {
    pub fn new(archiver: BucketArchiver, gate: Box<dyn HealthGate>, sinks: SinkSet) -> Self {
        Self {
            archiver,
            gate,
            sinks,
            label: None,
            notify_missing: false,
            purge_after_delivery: false,
        }
    }

    /// Build archiver, gate and sinks from configuration.
    pub fn from_config(config: &DaqConfig) -> Self {
        let archiver = BucketArchiver::new(&config.base_dir)
            .with_lock_suffixes(config.lock_suffixes.clone());
        Self::new(archiver, create_gate(&config.health), create_sinks(config))
            .with_label(config.label.clone())
            .notify_missing(config.notify_missing)
            .purge_after_delivery(config.purge_after_delivery)
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    /// Alert when a daily bucket is missing.
    pub fn notify_missing(mut self, enabled: bool) -> Self {
        self.notify_missing = enabled;
        self
    }

    /// Also remove the bucket's data files once delivered.
    pub fn purge_after_delivery(mut self, enabled: bool) -> Self {
        self.purge_after_delivery = enabled;
        self
    }

    pub fn sinks(&self) -> &SinkSet {
        &self.sinks
    }

    /// Archive and deliver `period`.
    pub fn deliver(&self, period: &PeriodKey) -> Result<Outcome, PipelineError> {
        let dir = self.archiver.bucket_dir(period);
        if !dir.is_dir() {
            tracing::warn!(period = %period, dir = %dir.display(), "Bucket directory not found");
            if self.notify_missing
                && period.granularity() == Granularity::Day
                && self.gate.is_reachable()
            {
                self.sinks.alert(&format!(
                    "No local data for {}: {} not found",
                    period,
                    dir.display()
                ));
            }
            return Ok(Outcome::NoBucket);
        }

        let Some(artifact) = self.archiver.archive(period)? else {
            tracing::info!(period = %period, "Nothing to deliver");
            return Ok(Outcome::Empty);
        };

        if !self.gate.is_reachable() {
            tracing::warn!(
                period = %period,
                artifact = %artifact.path.display(),
                "Network unreachable, delivery skipped; artifact kept"
            );
            return Ok(Outcome::Offline { artifact });
        }

        let meta = ArtifactMeta::new(&artifact, self.label.clone());
        let report = self.sinks.send(&artifact.path, &meta);

        if !report.any_success() {
            tracing::error!(
                period = %period,
                destinations = report.len(),
                artifact = %artifact.path.display(),
                "All destinations failed; artifact kept"
            );
            self.sinks.alert(&format!(
                "Delivery of {} failed for all {} destinations; artifact kept at {}",
                period,
                report.len(),
                artifact.path.display()
            ));
            return Ok(Outcome::Failed { artifact, report });
        }

        match fs::remove_file(&artifact.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(PipelineError::Cleanup {
                    path: artifact.path.clone(),
                    source,
                })
            }
        }
        if self.purge_after_delivery {
            self.purge(period);
        }

        tracing::info!(
            period = %period,
            successes = report.successes(),
            destinations = report.len(),
            "Artifact delivered and removed"
        );
        Ok(Outcome::Delivered { artifact, report })
    }

    /// Like [`deliver`](Self::deliver), with a panic turned into an error.
    pub fn deliver_guarded(&self, period: &PeriodKey) -> Result<Outcome, PipelineError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.deliver(period)))
            .unwrap_or_else(|payload| Err(PipelineError::Panicked(panic_message(payload))))
    }

    fn purge(&self, period: &PeriodKey) {
        let files = match self.archiver.bucket_files(period) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(period = %period, "Cannot list bucket for purge: {}", e);
                return;
            }
        };
        for file in files {
            match fs::remove_file(&file) {
                Ok(()) => tracing::debug!(file = %file.display(), "Purged"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(file = %file.display(), "Purge failed: {}", e),
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::DeliverySink;
    use crate::store::{PartitionStore, Record};
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct Gate(Arc<AtomicBool>);

    impl HealthGate for Gate {
        fn is_reachable(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        results: Vec<bool>,
        sent: Mutex<Vec<PathBuf>>,
        alerts: Mutex<Vec<String>>,
        panics: bool,
    }

    impl DeliverySink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        fn send(&self, artifact: &Path, _meta: &ArtifactMeta) -> DeliveryReport {
            if self.panics {
                panic!("sink exploded");
            }
            assert!(artifact.is_file(), "artifact must exist while sending");
            self.sent.lock().unwrap().push(artifact.to_path_buf());
            let mut report = DeliveryReport::new();
            for (i, ok) in self.results.iter().enumerate() {
                report.record(format!("dest:{}", i), *ok);
            }
            report
        }

        fn alert(&self, text: &str) {
            self.alerts.lock().unwrap().push(text.to_string());
        }
    }

    struct Fixture {
        _temp_dir: TempDir,
        base: PathBuf,
        online: Arc<AtomicBool>,
        sink: Arc<RecordingSink>,
        pipeline: DeliveryPipeline,
    }

    fn fixture(sink: RecordingSink) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().to_path_buf();
        let online = Arc::new(AtomicBool::new(true));
        let sink = Arc::new(sink);
        let pipeline = DeliveryPipeline::new(
            BucketArchiver::new(&base),
            Box::new(Gate(online.clone())),
            SinkSet::new().with(sink.clone()),
        );
        Fixture {
            _temp_dir: temp_dir,
            base,
            online,
            sink,
            pipeline,
        }
    }

    fn day() -> PeriodKey {
        PeriodKey::day(NaiveDate::from_ymd_opt(2025, 11, 25).unwrap())
    }

    fn write_day(base: &Path) {
        let store = PartitionStore::new(base, HashMap::new());
        let ts = day().first_day().and_hms_opt(12, 0, 0).unwrap();
        store.write(&Record::new("temperature", ts, ["21.4"])).unwrap();
    }

    #[test]
    fn test_missing_bucket() {
        let f = fixture(RecordingSink {
            results: vec![true],
            ..Default::default()
        });
        let outcome = f.pipeline.deliver(&day()).unwrap();
        assert!(matches!(outcome, Outcome::NoBucket));
        assert!(f.sink.sent.lock().unwrap().is_empty());
        assert!(f.sink.alerts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_bucket_alert() {
        let mut f = fixture(RecordingSink::default());
        f.pipeline = f.pipeline.notify_missing(true);

        f.pipeline.deliver(&day()).unwrap();
        assert_eq!(f.sink.alerts.lock().unwrap().len(), 1);
        assert!(f.sink.alerts.lock().unwrap()[0].contains("2025_11_25"));

        // Offline: no alert can be sent.
        f.online.store(false, Ordering::SeqCst);
        f.pipeline.deliver(&day()).unwrap();
        assert_eq!(f.sink.alerts.lock().unwrap().len(), 1);

        // Monthly periods never alert.
        f.online.store(true, Ordering::SeqCst);
        f.pipeline
            .deliver(&PeriodKey::month(NaiveDate::from_ymd_opt(2025, 11, 1).unwrap()))
            .unwrap();
        assert_eq!(f.sink.alerts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_bucket() {
        let f = fixture(RecordingSink::default());
        fs::create_dir_all(f.base.join("2025_11_25")).unwrap();
        let outcome = f.pipeline.deliver(&day()).unwrap();
        assert!(matches!(outcome, Outcome::Empty));
        assert!(!f.base.join("2025_11_25.zip").exists());
    }

    #[test]
    fn test_offline_keeps_artifact() {
        let f = fixture(RecordingSink {
            results: vec![true],
            ..Default::default()
        });
        write_day(&f.base);
        f.online.store(false, Ordering::SeqCst);

        let outcome = f.pipeline.deliver(&day()).unwrap();
        assert!(matches!(outcome, Outcome::Offline { .. }));
        assert!(f.sink.sent.lock().unwrap().is_empty());
        assert!(f.base.join("2025_11_25.zip").is_file());
    }

    #[test]
    fn test_delivered_removes_artifact() {
        let f = fixture(RecordingSink {
            results: vec![false, true],
            ..Default::default()
        });
        write_day(&f.base);

        let outcome = f.pipeline.deliver(&day()).unwrap();
        assert!(outcome.is_delivered());
        assert_eq!(f.sink.sent.lock().unwrap().len(), 1);
        assert!(!f.base.join("2025_11_25.zip").exists());
        // Source files stay unless purging is enabled.
        assert!(f
            .base
            .join("2025_11_25")
            .join("2025_11_25_temperature.csv")
            .is_file());
        assert!(f.sink.alerts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_all_failed_keeps_artifact_and_alerts() {
        let f = fixture(RecordingSink {
            results: vec![false, false],
            ..Default::default()
        });
        write_day(&f.base);

        let outcome = f.pipeline.deliver(&day()).unwrap();
        assert!(matches!(outcome, Outcome::Failed { .. }));
        assert!(f.base.join("2025_11_25.zip").is_file());

        let alerts = f.sink.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("failed for all 2 destinations"));
    }

    #[test]
    fn test_purge_after_delivery() {
        let mut f = fixture(RecordingSink {
            results: vec![true],
            ..Default::default()
        });
        f.pipeline = f.pipeline.purge_after_delivery(true);
        write_day(&f.base);

        assert!(f.pipeline.deliver(&day()).unwrap().is_delivered());
        let bucket = f.base.join("2025_11_25");
        assert!(bucket.is_dir());
        assert_eq!(fs::read_dir(&bucket).unwrap().count(), 0);
    }

    #[test]
    fn test_guarded_catches_panic() {
        let f = fixture(RecordingSink {
            panics: true,
            ..Default::default()
        });
        write_day(&f.base);

        match f.pipeline.deliver_guarded(&day()) {
            Err(PipelineError::Panicked(msg)) => assert_eq!(msg, "sink exploded"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(f.base.join("2025_11_25.zip").is_file());
    }
}
