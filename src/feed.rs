//! Upstream daily readings.

use crate::models::RawReading;
use crate::prelude::*;

pub mod lcsqa;

#[cfg(test)]
pub mod fixture;

#[async_trait]
pub trait ReadingFeed: Send + Sync {
    /// Fetches all the readings published for the day.
    ///
    /// An error means the whole day is unavailable.
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<RawReading>>;
}
