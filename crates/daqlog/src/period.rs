// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Period keys: the calendar day or month a bucket belongs to.
//!
//! Keys render as `YYYY_MM_DD` (day) or `YYYY_MM` (month). The rendered form is
//! used verbatim for bucket directories, CSV file prefixes and archive names.

use chrono::{Datelike, Days, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const DAY_FORMAT: &str = "%Y_%m_%d";
const MONTH_FORMAT: &str = "%Y_%m";

/// Partition granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One bucket per calendar day (telemetry data).
    Day,
    /// One bucket per calendar month (operational logs, monthly rollups).
    Month,
}

impl Granularity {
    /// Human-readable report kind used in captions.
    pub fn report_name(&self) -> &'static str {
        match self {
            Self::Day => "Daily",
            Self::Month => "Monthly",
        }
    }
}

/// Identifies one bucket period.
///
/// For [`Granularity::Month`] the stored date is always the 1st of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodKey {
    granularity: Granularity,
    date: NaiveDate,
}

/// Error returned when a string is not a valid period key.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid period key '{0}' (expected YYYY_MM_DD or YYYY_MM)")]
pub struct ParsePeriodError(pub String);

impl PeriodKey {
    /// Day bucket containing `date`.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            granularity: Granularity::Day,
            date,
        }
    }

    /// Month bucket containing `date`.
    pub fn month(date: NaiveDate) -> Self {
        Self {
            granularity: Granularity::Month,
            date: date.with_day(1).unwrap_or(date),
        }
    }

    /// Bucket of the given granularity containing `timestamp`.
    pub fn for_timestamp(granularity: Granularity, timestamp: NaiveDateTime) -> Self {
        match granularity {
            Granularity::Day => Self::day(timestamp.date()),
            Granularity::Month => Self::month(timestamp.date()),
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// First calendar day covered by this period.
    pub fn first_day(&self) -> NaiveDate {
        self.date
    }

    /// The period immediately before this one.
    pub fn previous(&self) -> Self {
        match self.granularity {
            Granularity::Day => Self::day(self.date - Days::new(1)),
            Granularity::Month => Self::month(self.date - Months::new(1)),
        }
    }

    /// Whether `timestamp` falls inside this period.
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        Self::for_timestamp(self.granularity, timestamp) == *self
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = match self.granularity {
            Granularity::Day => DAY_FORMAT,
            Granularity::Month => MONTH_FORMAT,
        };
        write!(f, "{}", self.date.format(pattern))
    }
}

impl FromStr for PeriodKey {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParsePeriodError(s.to_string());

        match s.split('_').count() {
            3 => NaiveDate::parse_from_str(s, DAY_FORMAT)
                .map(Self::day)
                .map_err(|_| err()),
            2 => NaiveDate::parse_from_str(&format!("{}_01", s), DAY_FORMAT)
                .map(Self::month)
                .map_err(|_| err()),
            _ => Err(err()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_display() {
        assert_eq!(PeriodKey::day(date(2025, 11, 25)).to_string(), "2025_11_25");
        assert_eq!(PeriodKey::month(date(2025, 12, 17)).to_string(), "2025_12");
    }

    #[test]
    fn test_parse() {
        let day: PeriodKey = "2025_11_05".parse().unwrap();
        assert_eq!(day, PeriodKey::day(date(2025, 11, 5)));

        let month: PeriodKey = "2025_02".parse().unwrap();
        assert_eq!(month.granularity(), Granularity::Month);
        assert_eq!(month.first_day(), date(2025, 2, 1));

        assert!("2025-11-05".parse::<PeriodKey>().is_err());
        assert!("2025_13".parse::<PeriodKey>().is_err());
        assert!("yesterday".parse::<PeriodKey>().is_err());
    }

    #[test]
    fn test_previous_crosses_boundaries() {
        let new_year = PeriodKey::day(date(2026, 1, 1));
        assert_eq!(new_year.previous().to_string(), "2025_12_31");

        let march = PeriodKey::month(date(2024, 3, 31));
        assert_eq!(march.previous().to_string(), "2024_02");

        let january = PeriodKey::month(date(2026, 1, 1));
        assert_eq!(january.previous().to_string(), "2025_12");
    }

    #[test]
    fn test_contains() {
        let key = PeriodKey::month(date(2025, 11, 1));
        let inside = date(2025, 11, 30).and_hms_opt(23, 59, 59).unwrap();
        let outside = date(2025, 12, 1).and_hms_opt(0, 0, 0).unwrap();
        assert!(key.contains(inside));
        assert!(!key.contains(outside));
    }
}
