// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Partition store: date-bucketed, append-only CSV files.
//!
//! Layout: `<base>/<YYYY_MM_DD>/<YYYY_MM_DD>_<variable>.csv`. The header row is
//! written together with the first data row when the file is created, or ahead
//! of the row when an earlier writer left the file empty; later writes only
//! append.

use crate::period::{Granularity, PeriodKey};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const TIME_COLUMN: &str = "Time";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create bucket directory {path}: {source}")]
    Directory { path: PathBuf, source: io::Error },

    #[error("failed to append to {path}: {source}")]
    Append { path: PathBuf, source: io::Error },

    #[error("failed to encode row for {path}: {source}")]
    Encode { path: PathBuf, source: csv::Error },
}

/// One observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Variable name (`temperature`, `in_valve`, ...).
    pub variable: String,
    /// Local wall-clock time of the observation.
    pub timestamp: NaiveDateTime,
    /// Fields exactly as the producer delivered them.
    pub fields: Vec<String>,
}

impl Record {
    pub fn new(
        variable: impl Into<String>,
        timestamp: NaiveDateTime,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            variable: variable.into(),
            timestamp,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Make sure `path` exists as a directory.
///
/// Returns `true` if this call created it. A directory that already exists,
/// including one created concurrently by another writer, is success.
pub fn ensure_dir(path: &Path) -> io::Result<bool> {
    match fs::create_dir(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path)?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

/// Append-only, date-partitioned CSV store.
#[derive(Debug, Clone)]
pub struct PartitionStore {
    base_dir: PathBuf,
    granularity: Granularity,
    headers: HashMap<String, Vec<String>>,
}

impl PartitionStore {
    /// Create a daily store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, headers: HashMap<String, Vec<String>>) -> Self {
        Self {
            base_dir: base_dir.into(),
            granularity: Granularity::Day,
            headers,
        }
    }

    /// Use a different bucket granularity.
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding a period's files.
    pub fn bucket_dir(&self, period: &PeriodKey) -> PathBuf {
        self.base_dir.join(period.to_string())
    }

    /// CSV file for `(period, variable)`.
    pub fn bucket_file(&self, period: &PeriodKey, variable: &str) -> PathBuf {
        self.bucket_dir(period)
            .join(format!("{}_{}.csv", period, variable))
    }

    /// Header row for `variable`.
    pub fn header_for(&self, variable: &str) -> Vec<String> {
        self.headers
            .get(variable)
            .cloned()
            .unwrap_or_else(|| vec![TIME_COLUMN.to_string(), variable.to_string()])
    }

    /// Append one record, creating the bucket directory and file as needed.
    ///
    /// Returns the file the row was appended to.
    pub fn write(&self, record: &Record) -> Result<PathBuf, StoreError> {
        let period = PeriodKey::for_timestamp(self.granularity, record.timestamp);
        let dir = self.bucket_dir(&period);

        if ensure_dir(&dir).map_err(|source| StoreError::Directory {
            path: dir.clone(),
            source,
        })? {
            tracing::info!(dir = %dir.display(), "Created bucket directory");
        }

        let path = self.bucket_file(&period, &record.variable);
        let mut row = Vec::with_capacity(record.fields.len() + 1);
        row.push(record.timestamp.format(TIME_FORMAT).to_string());
        row.extend(record.fields.iter().cloned());

        let append_err = |source| StoreError::Append {
            path: path.clone(),
            source,
        };
        let encode_err = |source| StoreError::Encode {
            path: path.clone(),
            source,
        };

        match OpenOptions::new().append(true).create_new(true).open(&path) {
            Ok(file) => {
                let header = self.header_for(&record.variable);
                if let Err(e) = append_rows(file, &[header.as_slice(), row.as_slice()]) {
                    // Never leave a headerless file behind.
                    let _ = fs::remove_file(&path);
                    return Err(encode_err(e));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let file = OpenOptions::new()
                    .append(true)
                    .open(&path)
                    .map_err(append_err)?;
                let empty = file.metadata().map_err(append_err)?.len() == 0;
                if empty {
                    tracing::warn!(file = %path.display(), "Bucket file is empty, writing header");
                    let header = self.header_for(&record.variable);
                    append_rows(file, &[header.as_slice(), row.as_slice()])
                        .map_err(encode_err)?;
                } else {
                    append_rows(file, &[row.as_slice()]).map_err(encode_err)?;
                }
            }
            Err(e) => return Err(append_err(e)),
        }

        Ok(path)
    }

    /// Append one record, logging and dropping it on failure.
    ///
    /// Telemetry is sampled repeatedly, so a lost sample is not retried.
    pub fn record(&self, record: &Record) -> bool {
        match self.write(record) {
            Ok(path) => {
                tracing::debug!(
                    variable = %record.variable,
                    file = %path.display(),
                    "Record written"
                );
                true
            }
            Err(err) => {
                tracing::error!(variable = %record.variable, "Dropping record: {}", err);
                false
            }
        }
    }
}

/// Append `rows` to `file` as CRLF-terminated CSV, quoting only where needed.
///
/// The writer buffers everything and issues a single write on flush.
fn append_rows(file: File, rows: &[&[String]]) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .flexible(true)
        .from_writer(file);
    for row in rows {
        wtr.write_record(row.iter())?;
    }
    wtr.flush()?;
    Ok(())
}
