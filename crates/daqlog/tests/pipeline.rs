// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end: write a day of readings, wake the scheduler on the next day,
//! check what was shipped and what is left on disk.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use daqlog::{
    ArtifactMeta, BucketArchiver, DeliveryPipeline, DeliveryReport, DeliveryScheduler,
    DeliverySink, HealthGate, Outcome, PartitionStore, Record, SinkSet,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Captured archive contents: entry name -> text.
type Shipped = Vec<(String, Vec<(String, String)>)>;

struct CapturingSink {
    accept: bool,
    shipped: Mutex<Shipped>,
}

impl DeliverySink for CapturingSink {
    fn name(&self) -> &str {
        "capture"
    }

    fn send(&self, artifact: &Path, meta: &ArtifactMeta) -> DeliveryReport {
        let mut archive = zip::ZipArchive::new(File::open(artifact).unwrap()).unwrap();
        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let mut text = String::new();
            entry.read_to_string(&mut text).unwrap();
            entries.push((entry.name().to_string(), text));
        }
        self.shipped
            .lock()
            .unwrap()
            .push((meta.caption(), entries));

        let mut report = DeliveryReport::new();
        report.record("capture:1", self.accept);
        report
    }
}

struct Gate(Arc<AtomicBool>);

impl HealthGate for Gate {
    fn is_reachable(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn day_d() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 25).unwrap()
}

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    day_d().and_hms_opt(h, m, s).unwrap()
}

fn headers() -> HashMap<String, Vec<String>> {
    let mut headers = HashMap::new();
    headers.insert(
        "temperature".to_string(),
        vec!["Time".to_string(), "Temperature(°C)".to_string()],
    );
    headers
}

struct Setup {
    _temp_dir: TempDir,
    base: std::path::PathBuf,
    online: Arc<AtomicBool>,
    sink: Arc<CapturingSink>,
    scheduler: DeliveryScheduler,
}

fn setup(accept: bool, purge: bool) -> Setup {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path().to_path_buf();

    let store = PartitionStore::new(&base, headers());
    store
        .write(&Record::new("temperature", at(8, 0, 0), ["21.4"]))
        .unwrap();
    store
        .write(&Record::new("temperature", at(20, 30, 15), ["21.6"]))
        .unwrap();

    let online = Arc::new(AtomicBool::new(true));
    let sink = Arc::new(CapturingSink {
        accept,
        shipped: Mutex::new(Vec::new()),
    });
    let pipeline = DeliveryPipeline::new(
        BucketArchiver::new(&base),
        Box::new(Gate(online.clone())),
        SinkSet::new().with(sink.clone()),
    )
    .with_label(Some("SO".into()))
    .purge_after_delivery(purge);
    let scheduler = DeliveryScheduler::new(pipeline, Duration::minutes(10));

    Setup {
        _temp_dir: temp_dir,
        base,
        online,
        sink,
        scheduler,
    }
}

#[test]
fn day_is_archived_delivered_and_cleaned_up() {
    let s = setup(true, true);
    let next_day = day_d().succ_opt().unwrap();

    let report = s.scheduler.run_cycle(next_day);
    assert_eq!(report.deliveries.len(), 1);
    assert!(report.deliveries[0].1.as_ref().unwrap().is_delivered());

    let shipped = s.sink.shipped.lock().unwrap();
    assert_eq!(shipped.len(), 1);
    let (caption, entries) = &shipped[0];
    assert!(caption.starts_with("[SO] Daily IoT report\nPeriod: 2025_11_25\nSize: "));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "2025_11_25/2025_11_25_temperature.csv");
    assert_eq!(
        entries[0].1.lines().collect::<Vec<_>>(),
        vec!["Time,Temperature(°C)", "08:00:00,21.4", "20:30:15,21.6"]
    );

    assert!(!s.base.join("2025_11_25.zip").exists());
    assert!(!s
        .base
        .join("2025_11_25")
        .join("2025_11_25_temperature.csv")
        .exists());
}

#[test]
fn offline_cycle_keeps_artifact_for_resend() {
    let s = setup(true, true);
    s.online.store(false, Ordering::SeqCst);

    let report = s.scheduler.run_cycle(day_d().succ_opt().unwrap());
    assert!(matches!(
        report.deliveries[0].1,
        Ok(Outcome::Offline { .. })
    ));
    assert!(s.sink.shipped.lock().unwrap().is_empty());
    assert!(s.base.join("2025_11_25.zip").is_file());

    // Manual resend once the network is back; the archive is rebuilt.
    s.online.store(true, Ordering::SeqCst);
    let outcome = s
        .scheduler
        .pipeline()
        .deliver(&daqlog::PeriodKey::day(day_d()))
        .unwrap();
    assert!(outcome.is_delivered());
    assert!(!s.base.join("2025_11_25.zip").exists());
}

#[test]
fn rejected_delivery_keeps_everything() {
    let s = setup(false, true);

    let report = s.scheduler.run_cycle(day_d().succ_opt().unwrap());
    assert!(matches!(report.deliveries[0].1, Ok(Outcome::Failed { .. })));
    assert_eq!(s.sink.shipped.lock().unwrap().len(), 1);
    assert!(s.base.join("2025_11_25.zip").is_file());
    assert!(s
        .base
        .join("2025_11_25")
        .join("2025_11_25_temperature.csv")
        .is_file());
}

#[test]
fn first_of_month_ships_day_then_month() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path();

    let store = PartitionStore::new(base, headers());
    let last_day = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();
    store
        .write(&Record::new(
            "temperature",
            last_day.and_hms_opt(23, 50, 0).unwrap(),
            ["19.9"],
        ))
        .unwrap();
    let month_dir = base.join("2025_11");
    std::fs::create_dir_all(&month_dir).unwrap();
    std::fs::write(month_dir.join("uploader.log"), "started\n").unwrap();

    let sink = Arc::new(CapturingSink {
        accept: true,
        shipped: Mutex::new(Vec::new()),
    });
    let pipeline = DeliveryPipeline::new(
        BucketArchiver::new(base),
        Box::new(daqlog::AlwaysReachable),
        SinkSet::new().with(sink.clone()),
    );
    let scheduler = DeliveryScheduler::new(pipeline, Duration::minutes(5));

    scheduler.run_cycle(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());

    let shipped = sink.shipped.lock().unwrap();
    assert_eq!(shipped.len(), 2);
    assert!(shipped[0].0.contains("Period: 2025_11_30"));
    assert!(shipped[1].0.starts_with("Monthly IoT report\nPeriod: 2025_11"));
    assert_eq!(shipped[1].1[0].0, "2025_11/uploader.log");
}
