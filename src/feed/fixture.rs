use std::sync::atomic::{AtomicUsize, Ordering};

use crate::feed::ReadingFeed;
use crate::models::RawReading;
use crate::prelude::*;

/// Feed serving prepared days. Days without readings are unavailable.
#[derive(Default)]
pub struct StaticFeed {
    days: AHashMap<NaiveDate, Vec<RawReading>>,
    n_fetches: AtomicUsize,
}

impl StaticFeed {
    pub fn with_day(mut self, date: NaiveDate, readings: Vec<RawReading>) -> Self {
        self.days.insert(date, readings);
        self
    }

    /// Serves one valid reading per day for the station and pollutant, at the given hour.
    pub fn with_daily_readings(
        mut self,
        station: &str,
        pollutant: &str,
        hour: u32,
        dates: impl IntoIterator<Item = NaiveDate>,
        value: impl Fn(NaiveDate) -> f64,
    ) -> Self {
        for date in dates {
            self.days
                .entry(date)
                .or_default()
                .push(raw_reading(station, pollutant, date, hour, value(date)));
        }
        self
    }

    pub fn n_fetches(&self) -> usize {
        self.n_fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReadingFeed for StaticFeed {
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<RawReading>> {
        self.n_fetches.fetch_add(1, Ordering::Relaxed);
        self.days
            .get(&date)
            .cloned()
            .ok_or_else(|| anyhow!("no file for {}", date))
    }
}

pub fn raw_reading(station: &str, pollutant: &str, date: NaiveDate, hour: u32, value: f64) -> RawReading {
    RawReading {
        station: station.to_string(),
        pollutant: pollutant.to_string(),
        is_valid: true,
        raw_value: value,
        timestamp: format!("{} {:02}:00:00", date.format("%Y/%m/%d"), hour),
    }
}
