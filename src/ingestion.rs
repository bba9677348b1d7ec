//! Turns upstream daily files into history updates, one calendar day at a time.

use std::collections::hash_map::Entry;

use futures::{stream, Stream, StreamExt};
use serde::Serialize;

use crate::feed::ReadingFeed;
use crate::filter::{filter_all, FilterReport};
use crate::helpers::time::DateRange;
use crate::models::Key;
use crate::prelude::*;
use crate::store::{HistoryStore, InvariantViolation};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DayStatus {
    Applied,

    /// The upstream file was unavailable. The day is skipped, and only aging is applied.
    Gap { reason: String },
}

#[must_use]
#[derive(Debug, Serialize)]
pub struct DayReport {
    pub date: NaiveDate,

    #[serde(flatten)]
    pub status: DayStatus,

    pub filter: FilterReport,

    /// Extra readings for a key which already had one for the day.
    pub n_conflicts: usize,

    /// Readings dated another day than the one requested.
    pub n_misdated: usize,

    pub n_updated: usize,
    pub n_aged: usize,

    #[serde(skip)]
    pub touched: Vec<Key>,
}

impl DayReport {
    pub const fn is_gap(&self) -> bool {
        matches!(self.status, DayStatus::Gap { .. })
    }
}

pub struct Pipeline {
    store: Arc<HistoryStore>,
    feed: Arc<dyn ReadingFeed>,
}

impl Pipeline {
    pub fn new(store: Arc<HistoryStore>, feed: Arc<dyn ReadingFeed>) -> Self {
        Self { store, feed }
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    /// Ingests the days in order. The next day is not fetched until the previous one is applied.
    pub fn ingest(&self, range: DateRange) -> impl Stream<Item = Result<DayReport, InvariantViolation>> + '_ {
        stream::iter(range).then(move |date| self.ingest_day(date))
    }

    /// Fetches, filters, and applies a single day.
    ///
    /// An unavailable feed is not an error: the day becomes a gap.
    #[instrument(skip_all, fields(%date))]
    pub async fn ingest_day(&self, date: NaiveDate) -> Result<DayReport, InvariantViolation> {
        let start_instant = Instant::now();

        let raw_readings = match self.feed.fetch_day(date).await {
            Ok(raw_readings) => raw_readings,
            Err(error) => {
                warn!("skipping the day: {:#}", error);
                let outcome = self.store.apply_batch(date, AHashMap::default())?;
                return Ok(DayReport {
                    date,
                    status: DayStatus::Gap {
                        reason: format!("{:#}", error),
                    },
                    filter: FilterReport::default(),
                    n_conflicts: 0,
                    n_misdated: 0,
                    n_updated: outcome.n_updated,
                    n_aged: outcome.n_aged,
                    touched: outcome.touched,
                });
            }
        };

        let (readings, filter) = filter_all(raw_readings);
        let mut n_conflicts = 0;
        let mut n_misdated = 0;
        let mut values = AHashMap::default();
        for reading in readings {
            if reading.date != date {
                n_misdated += 1;
                continue;
            }
            match values.entry(reading.key) {
                Entry::Vacant(entry) => {
                    entry.insert(reading.value);
                }
                Entry::Occupied(entry) => {
                    n_conflicts += 1;
                    debug!(key = %entry.key(), kept = *entry.get(), dropped = reading.value, "conflicting reading");
                }
            }
        }
        if n_conflicts != 0 {
            warn!(n_conflicts, "kept the first reading of the conflicting keys");
        }
        if n_misdated != 0 {
            warn!(n_misdated, "dropped the readings of other days");
        }

        let outcome = self.store.apply_batch(date, values)?;
        info!(
            n_accepted = filter.n_accepted,
            n_rejected = filter.n_rejected(),
            n_updated = outcome.n_updated,
            n_aged = outcome.n_aged,
            elapsed = ?start_instant.elapsed(),
            "applied",
        );
        Ok(DayReport {
            date,
            status: DayStatus::Applied,
            filter,
            n_conflicts,
            n_misdated,
            n_updated: outcome.n_updated,
            n_aged: outcome.n_aged,
            touched: outcome.touched,
        })
    }
}
