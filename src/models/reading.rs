use crate::models::Key;
use crate::prelude::*;

/// Reading as it comes from the upstream daily file.
#[derive(Clone, Debug, PartialEq)]
pub struct RawReading {
    pub station: String,
    pub pollutant: String,

    /// Whether the upstream marked the reading as validated.
    pub is_valid: bool,

    /// Raw concentration, `NaN` when the upstream value is missing.
    pub raw_value: f64,

    /// Start of the hourly bucket, `YYYY/MM/DD HH:MM:SS`.
    pub timestamp: String,
}

/// Accepted and normalized reading.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub key: Key,
    pub date: NaiveDate,
    pub value: f64,
}
