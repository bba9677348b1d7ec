use std::str::FromStr;

use crate::models::WINDOW_DAYS;
use crate::prelude::*;

/// `FR` followed by five digits.
pub fn station_code(value: &str) -> Result<String> {
    match value.strip_prefix("FR") {
        Some(digits) if digits.len() == 5 && digits.bytes().all(|byte| byte.is_ascii_digit()) => {
            Ok(value.to_string())
        }
        _ => Err(anyhow!("`{}` is not a station code", value)),
    }
}

/// Number of days within the retention window.
pub fn window_days(value: &str) -> Result<u16> {
    match u16::from_str(value)? {
        value if usize::from(value) <= WINDOW_DAYS => Ok(value),
        value => Err(anyhow!("{} exceeds the {}-day window", value, WINDOW_DAYS)),
    }
}

pub fn non_zero_u32(value: &str) -> Result<u32> {
    match FromStr::from_str(value)? {
        value if value >= 1 => Ok(value),
        _ => Err(anyhow!("expected a positive number")),
    }
}
