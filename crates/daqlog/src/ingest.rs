// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ingestion: raw transport readings in, partitioned records out.
//!
//! Subscribed transports (an MQTT client piping `<topic> <payload>` lines)
//! feed a [`LineSource`]; HTTP endpoints sampled on an interval feed a
//! [`PollSource`](crate::poll::PollSource). Routing is a plain topic to
//! variable lookup.

use crate::config::DaqConfig;
use crate::schedule::{Clock, StopHandle, SystemClock};
use crate::store::{PartitionStore, Record};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::io::{self, BufRead};
use std::sync::Arc;

/// One message as received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub topic: String,
    pub payload: String,
    /// Fields already split by the source; `None` splits `payload` on commas.
    pub fields: Option<Vec<String>>,
    pub received_at: NaiveDateTime,
}

impl Reading {
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<String>,
        received_at: NaiveDateTime,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            fields: None,
            received_at,
        }
    }

    /// Attach pre-split fields.
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// Topic to variable routing table.
#[derive(Debug, Clone, Default)]
pub struct TopicMap {
    routes: HashMap<String, String>,
}

impl TopicMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every configured variable, keyed by its topic (or its name when no
    /// topic is set), plus one route per HTTP poll.
    pub fn from_config(config: &DaqConfig) -> Self {
        let mut map = Self::new();
        for var in &config.variables {
            let topic = var.topic.clone().unwrap_or_else(|| var.name.clone());
            map = map.with_route(topic, var.name.clone());
        }
        for poll in &config.poll {
            map = map.with_route(poll.topic(), poll.variable.clone());
        }
        map
    }

    pub fn with_route(mut self, topic: impl Into<String>, variable: impl Into<String>) -> Self {
        self.routes.insert(topic.into(), variable.into());
        self
    }

    pub fn resolve(&self, topic: &str) -> Option<&str> {
        self.routes.get(topic).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Turn a reading into a record. Payloads without pre-split fields are
    /// split on commas.
    ///
    /// Returns `None` for unmapped topics.
    pub fn to_record(&self, reading: &Reading) -> Option<Record> {
        let variable = self.resolve(&reading.topic)?;
        let record = match &reading.fields {
            Some(fields) => Record::new(variable, reading.received_at, fields.iter().cloned()),
            None => Record::new(
                variable,
                reading.received_at,
                reading.payload.split(',').map(str::trim),
            ),
        };
        Some(record)
    }
}

/// Anything that yields readings.
pub trait ReadingSource {
    /// Next reading, or `None` when the source is exhausted.
    fn next_reading(&mut self) -> io::Result<Option<Reading>>;
}

/// Reads `<topic> <payload>` lines, stamping each with the local time.
///
/// Lines that are not valid UTF-8 or carry no payload are skipped; only a
/// failing reader ends the source with an error.
pub struct LineSource<R: BufRead> {
    reader: R,
    clock: Arc<dyn Clock>,
    buf: Vec<u8>,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            clock: Arc::new(SystemClock),
            buf: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl<R: BufRead> ReadingSource for LineSource<R> {
    fn next_reading(&mut self) -> io::Result<Option<Reading>> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
                return Ok(None);
            }

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    tracing::debug!(
                        line = %String::from_utf8_lossy(&self.buf).trim(),
                        "Skipping line that is not UTF-8: {}",
                        e
                    );
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match line.split_once(char::is_whitespace) {
                Some((topic, payload)) if !payload.trim().is_empty() => {
                    return Ok(Some(Reading::new(
                        topic,
                        payload.trim(),
                        self.clock.now(),
                    )));
                }
                _ => tracing::debug!(line = %line, "Skipping malformed line"),
            }
        }
    }
}

/// Ingestion statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    /// Readings received.
    pub readings: u64,
    /// Records written.
    pub written: u64,
    /// Readings on topics with no route.
    pub unmapped: u64,
    /// Records dropped on write failure.
    pub dropped: u64,
}

/// Drives a source into the partition store.
pub struct Ingester {
    store: PartitionStore,
    topics: TopicMap,
    stop: StopHandle,
    stats: IngestStats,
}

impl Ingester {
    pub fn new(store: PartitionStore, topics: TopicMap) -> Self {
        Self {
            store,
            topics,
            stop: StopHandle::new(),
            stats: IngestStats::default(),
        }
    }

    pub fn from_config(config: &DaqConfig) -> Self {
        Self::new(
            PartitionStore::new(&config.base_dir, config.header_catalog()),
            TopicMap::from_config(config),
        )
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Share an existing stop flag.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Route and store one reading.
    pub fn process(&mut self, reading: &Reading) {
        self.stats.readings += 1;
        let Some(record) = self.topics.to_record(reading) else {
            self.stats.unmapped += 1;
            tracing::debug!(topic = %reading.topic, "No variable for topic");
            return;
        };
        if self.store.record(&record) {
            self.stats.written += 1;
        } else {
            self.stats.dropped += 1;
        }
    }

    /// Consume `source` until it ends or a stop is requested (blocking).
    pub fn run<S: ReadingSource>(&mut self, source: &mut S) -> io::Result<()> {
        tracing::info!(
            base_dir = %self.store.base_dir().display(),
            topics = self.topics.len(),
            "Starting ingester"
        );

        while self.stop.is_running() {
            match source.next_reading()? {
                Some(reading) => self.process(&reading),
                None => break,
            }
        }

        tracing::info!(
            readings = self.stats.readings,
            written = self.stats.written,
            unmapped = self.stats.unmapped,
            dropped = self.stats.dropped,
            "Ingester stopped"
        );
        Ok(())
    }
}
