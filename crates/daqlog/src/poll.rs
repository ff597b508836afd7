// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP poll source: sample a JSON endpoint on a fixed interval.
//!
//! Every sample becomes one [`Reading`] carrying the configured JSON pointers
//! as fields, in column order. A failed request, an error status or a body
//! that is not JSON drops that sample only; the next one is taken on schedule.

use crate::config::PollConfig;
use crate::ingest::{Reading, ReadingSource};
use crate::schedule::{Clock, StopHandle, SystemClock};
use chrono::{Duration, NaiveDateTime};
use serde_json::Value;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Longest single sleep; the stop flag is re-checked after each slice.
const SLEEP_SLICE: std::time::Duration = std::time::Duration::from_secs(1);

/// Errors for one sample.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pick `pointers` out of `doc`. Strings are taken verbatim, other scalars in
/// their JSON form; missing values and `null` become empty fields.
pub fn extract_fields(doc: &Value, pointers: &[String]) -> Vec<String> {
    pointers
        .iter()
        .map(|pointer| match doc.pointer(pointer) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
            None => {
                tracing::debug!(pointer = %pointer, "Field missing from response");
                String::new()
            }
        })
        .collect()
}

/// Samples one endpoint every `interval_secs`.
pub struct PollSource {
    config: PollConfig,
    client: reqwest::blocking::Client,
    clock: Arc<dyn Clock>,
    stop: StopHandle,
    next_at: Option<NaiveDateTime>,
}

impl PollSource {
    pub fn new(config: PollConfig) -> Result<Self, PollError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            config,
            client,
            clock: Arc::new(SystemClock),
            stop: StopHandle::new(),
            next_at: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an existing stop flag.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn variable(&self) -> &str {
        &self.config.variable
    }

    fn interval(&self) -> Duration {
        Duration::seconds(self.config.interval_secs.min(u64::from(u32::MAX)) as i64)
    }

    fn fetch(&self) -> Result<(String, Vec<String>), PollError> {
        let resp = self.client.get(&self.config.url).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PollError::Status(status.as_u16()));
        }
        let body = resp.text()?;
        let doc: Value = serde_json::from_str(&body)?;
        let fields = extract_fields(&doc, &self.config.fields);
        Ok((body, fields))
    }

    /// Take one sample now; `None` when it had to be dropped.
    pub fn poll_once(&self) -> Option<Reading> {
        match self.fetch() {
            Ok((body, fields)) => {
                Some(Reading::new(self.config.topic(), body, self.clock.now()).with_fields(fields))
            }
            Err(e) => {
                // The URL usually carries an API key; log the variable only.
                tracing::warn!(variable = %self.config.variable, "Poll failed: {}", e);
                None
            }
        }
    }

    /// Returns `false` if a stop was requested first.
    fn wait_until(&self, at: NaiveDateTime) -> bool {
        loop {
            if !self.stop.is_running() {
                return false;
            }
            let now = self.clock.now();
            if now >= at {
                return true;
            }
            let remaining = (at - now).to_std().unwrap_or(SLEEP_SLICE);
            self.clock.sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

impl ReadingSource for PollSource {
    fn next_reading(&mut self) -> io::Result<Option<Reading>> {
        loop {
            match self.next_at {
                Some(at) if !self.wait_until(at) => return Ok(None),
                None if !self.stop.is_running() => return Ok(None),
                _ => {}
            }

            self.next_at = Some(self.clock.now() + self.interval());
            if let Some(reading) = self.poll_once() {
                return Ok(Some(reading));
            }
        }
    }
}
