// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Operational log: `<base>/<YYYY_MM>/<service>.log`, switching file when the
//! month changes.

use crate::period::{Granularity, PeriodKey};
use crate::schedule::{Clock, SystemClock};
use crate::store::ensure_dir;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Append-only log file rolled per calendar month.
pub struct MonthlyLog {
    base_dir: PathBuf,
    service: String,
    clock: Arc<dyn Clock>,
    current: Option<(PeriodKey, File)>,
}

impl MonthlyLog {
    /// Open the current month's file under `base_dir`.
    pub fn open(base_dir: impl Into<PathBuf>, service: impl Into<String>) -> io::Result<Self> {
        Self::open_with_clock(base_dir, service, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        base_dir: impl Into<PathBuf>,
        service: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let mut log = Self {
            base_dir: base_dir.into(),
            service: service.into(),
            clock,
            current: None,
        };
        log.file()?;
        Ok(log)
    }

    /// Log file for `period`.
    pub fn path_for(&self, period: &PeriodKey) -> PathBuf {
        self.base_dir
            .join(period.to_string())
            .join(format!("{}.log", self.service))
    }

    /// File currently written to, if open.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.current.as_ref().map(|(period, _)| self.path_for(period))
    }

    /// The open file for this month, reopening on a month change.
    fn file(&mut self) -> io::Result<&mut File> {
        let period = PeriodKey::for_timestamp(Granularity::Month, self.clock.now());
        let stale = !matches!(&self.current, Some((open, _)) if *open == period);

        if stale {
            let path = self.path_for(&period);
            if let Some(parent) = path.parent() {
                ensure_dir(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            self.current = Some((period, file));
        }

        match &mut self.current {
            Some((_, file)) => Ok(file),
            None => Err(io::Error::other("log file not open")),
        }
    }
}

impl Write for MonthlyLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.current {
            Some((_, file)) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Install the global subscriber: stdout plus the monthly log of `service`.
///
/// `RUST_LOG` overrides `level` when set.
pub fn init_tracing(base_dir: &Path, service: &str, level: &str) -> io::Result<PathBuf> {
    let log = MonthlyLog::open(base_dir, service)?;
    let path = log
        .current_path()
        .unwrap_or_else(|| base_dir.join(format!("{}.log", service)));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(io::stdout.and(Mutex::new(log)))
        .init();

    Ok(path)
}
