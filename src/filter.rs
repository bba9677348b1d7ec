//! Validation and normalization of raw readings.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::models::{Hour, Key, RawReading, Reading};
use crate::prelude::*;

/// Precursors and species which are not monitored targets.
pub const IGNORED_POLLUTANTS: [&str; 3] = ["NO", "NOX as NO2", "C6H6"];

pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    NotValidated,
    NonPositiveValue,
    IgnoredPollutant,
    MalformedTimestamp,
}

/// Accepts or rejects a single reading.
#[allow(clippy::neg_cmp_op_on_partial_ord)]
pub fn filter(raw: RawReading) -> StdResult<Reading, Rejection> {
    if !raw.is_valid {
        return Err(Rejection::NotValidated);
    }
    // `NaN` is rejected as well.
    if !(raw.raw_value > 0.0) {
        return Err(Rejection::NonPositiveValue);
    }
    if IGNORED_POLLUTANTS.contains(&raw.pollutant.as_str()) {
        return Err(Rejection::IgnoredPollutant);
    }
    let timestamp = NaiveDateTime::parse_from_str(&raw.timestamp, TIMESTAMP_FORMAT)
        .map_err(|_| Rejection::MalformedTimestamp)?;
    let hour = Hour::try_from(timestamp.hour()).map_err(|_| Rejection::MalformedTimestamp)?;
    Ok(Reading {
        key: Key::new(raw.station, raw.pollutant, hour),
        date: timestamp.date(),
        value: raw.raw_value,
    })
}

/// Filters a whole day, counting the rejections.
pub fn filter_all(raw_readings: impl IntoIterator<Item = RawReading>) -> (Vec<Reading>, FilterReport) {
    let mut report = FilterReport::default();
    let readings = raw_readings
        .into_iter()
        .filter_map(|raw| match filter(raw) {
            Ok(reading) => {
                report.n_accepted += 1;
                Some(reading)
            }
            Err(rejection) => {
                report.record(rejection);
                None
            }
        })
        .collect();
    (readings, report)
}

#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub n_accepted: usize,
    pub n_not_validated: usize,
    pub n_non_positive: usize,
    pub n_ignored_pollutant: usize,
    pub n_malformed_timestamp: usize,
}

impl FilterReport {
    pub fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::NotValidated => self.n_not_validated += 1,
            Rejection::NonPositiveValue => self.n_non_positive += 1,
            Rejection::IgnoredPollutant => self.n_ignored_pollutant += 1,
            Rejection::MalformedTimestamp => self.n_malformed_timestamp += 1,
        }
    }

    pub const fn n_rejected(&self) -> usize {
        self.n_not_validated
            + self.n_non_positive
            + self.n_ignored_pollutant
            + self.n_malformed_timestamp
    }

    pub fn merge(&mut self, other: &Self) {
        self.n_accepted += other.n_accepted;
        self.n_not_validated += other.n_not_validated;
        self.n_non_positive += other.n_non_positive;
        self.n_ignored_pollutant += other.n_ignored_pollutant;
        self.n_malformed_timestamp += other.n_malformed_timestamp;
    }
}
