// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Delivery scheduler.
//!
//! One loop wakes a fixed offset past local midnight, delivers the day that
//! just closed and, on the 1st of a month, the month that just closed. The
//! daily delivery always runs first. Nothing that happens inside a cycle ends
//! the loop; only a [`StopHandle`] (or killing the process) does.

use crate::config::DaqConfig;
use crate::period::PeriodKey;
use crate::pipeline::{DeliveryPipeline, Outcome, PipelineError};
use chrono::{Datelike, Days, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Longest single sleep; the clock is re-read after each slice.
const SLEEP_SLICE: std::time::Duration = std::time::Duration::from_secs(1);

/// Wall-clock source.
pub trait Clock: Send + Sync {
    /// Current local wall-clock time.
    fn now(&self) -> NaiveDateTime;

    /// Block for `duration`.
    fn sleep(&self, duration: std::time::Duration) {
        std::thread::sleep(duration);
    }
}

/// The host's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Next boundary strictly after `now`: midnight plus `offset`, pushed forward
/// by whole days while it is not in the future.
pub fn next_wake(now: NaiveDateTime, offset: Duration) -> NaiveDateTime {
    let mut wake = now.date().and_time(NaiveTime::MIN) + offset;
    while wake <= now {
        wake += Duration::days(1);
    }
    wake
}

/// Handle to stop a running scheduler from another thread.
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Request a stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one wake-up.
#[derive(Debug)]
pub struct CycleReport {
    /// Boundary date the cycle ran for.
    pub boundary: NaiveDate,
    /// Deliveries in the order they ran.
    pub deliveries: Vec<(PeriodKey, Result<Outcome, PipelineError>)>,
}

impl CycleReport {
    pub fn periods(&self) -> Vec<PeriodKey> {
        self.deliveries.iter().map(|(period, _)| *period).collect()
    }
}

/// Sleeps until each boundary and runs the pipeline for the closed periods.
pub struct DeliveryScheduler {
    pipeline: DeliveryPipeline,
    clock: Box<dyn Clock>,
    offset: Duration,
    monthly: bool,
    stop: StopHandle,
}

impl DeliveryScheduler {
    pub fn new(pipeline: DeliveryPipeline, offset: Duration) -> Self {
        Self {
            pipeline,
            clock: Box::new(SystemClock),
            offset,
            monthly: true,
            stop: StopHandle::new(),
        }
    }

    pub fn from_config(config: &DaqConfig) -> Self {
        Self::new(DeliveryPipeline::from_config(config), config.daily_offset())
            .monthly(config.monthly_delivery)
    }

    /// Use another clock.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enable or disable the monthly delivery.
    pub fn monthly(mut self, enabled: bool) -> Self {
        self.monthly = enabled;
        self
    }

    pub fn pipeline(&self) -> &DeliveryPipeline {
        &self.pipeline
    }

    /// Share an existing stop flag.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Get a handle to stop the scheduler from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Next boundary from the scheduler's clock.
    pub fn next_wake(&self) -> NaiveDateTime {
        next_wake(self.clock.now(), self.offset)
    }

    /// Run until stopped (blocking).
    pub fn run(&self) {
        tracing::info!(
            offset_minutes = self.offset.num_minutes(),
            monthly = self.monthly,
            "Delivery scheduler started"
        );

        while self.stop.is_running() {
            let wake = self.next_wake();
            tracing::info!(next_wake = %wake, "Sleeping until next boundary");

            if !self.sleep_until(wake) {
                break;
            }
            self.run_cycle(wake.date());
        }

        tracing::info!("Delivery scheduler stopped");
    }

    /// Deliver the periods closed by the boundary on `boundary`.
    ///
    /// The daily bucket is the day before `boundary`; on the 1st the previous
    /// month follows it.
    pub fn run_cycle(&self, boundary: NaiveDate) -> CycleReport {
        let mut periods = Vec::with_capacity(2);
        if let Some(yesterday) = boundary.checked_sub_days(Days::new(1)) {
            periods.push(PeriodKey::day(yesterday));
        }
        if self.monthly && boundary.day() == 1 {
            periods.push(PeriodKey::month(boundary).previous());
        }

        let mut deliveries = Vec::with_capacity(periods.len());
        for period in periods {
            tracing::info!(period = %period, "Delivery cycle");
            let result = self.pipeline.deliver_guarded(&period);
            match &result {
                Ok(outcome) => tracing::info!(period = %period, "Delivery finished: {}", outcome),
                Err(e) => tracing::error!(period = %period, "Delivery cycle failed: {}", e),
            }
            deliveries.push((period, result));
        }

        CycleReport {
            boundary,
            deliveries,
        }
    }

    /// Sleep in slices until `wake`. Returns `false` if stopped first.
    fn sleep_until(&self, wake: NaiveDateTime) -> bool {
        loop {
            if !self.stop.is_running() {
                return false;
            }
            let now = self.clock.now();
            if now >= wake {
                return true;
            }
            let remaining = (wake - now).to_std().unwrap_or(SLEEP_SLICE);
            self.clock.sleep(remaining.min(SLEEP_SLICE));
        }
    }
}
