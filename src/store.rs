//! In-memory history store.
//!
//! Histories are held behind [`Arc`] and replaced as a whole on every update,
//! so a reader always observes either the previous or the next version of a history.
//! The store expects a single writer: the update scheduler serializes catch-ups.

use dashmap::DashMap;
use itertools::Itertools;
use thiserror::Error;

use crate::models::{History, HistoryError, Key};
use crate::prelude::*;

/// Broken history invariant, with the offending key.
#[derive(Debug, Error)]
#[error("invariant violation in `{key}`")]
pub struct InvariantViolation {
    pub key: Key,

    #[source]
    pub source: HistoryError,
}

#[must_use]
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Keys which received a reading.
    pub n_updated: usize,

    /// Known keys without a reading whose window has moved.
    pub n_aged: usize,

    /// Keys whose history has changed and needs to be persisted.
    pub touched: Vec<Key>,
}

#[derive(Default)]
pub struct HistoryStore {
    histories: DashMap<Key, Arc<History>, ahash::RandomState>,
}

impl HistoryStore {
    pub fn from_histories(histories: impl IntoIterator<Item = (Key, History)>) -> Self {
        Self {
            histories: histories
                .into_iter()
                .map(|(key, history)| (key, Arc::new(history)))
                .collect(),
        }
    }

    /// Read-only snapshot of the key's history, empty for an unknown key.
    pub fn get(&self, key: &Key) -> Arc<History> {
        self.histories
            .get(key)
            .map(|history| Arc::clone(history.value()))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn has_station(&self, station: &str) -> bool {
        self.histories.iter().any(|entry| entry.key().station == station)
    }

    /// Sorted pollutants the station has a history for.
    pub fn monitored_pollutants(&self, station: &str) -> Vec<String> {
        self.histories
            .iter()
            .filter(|entry| entry.key().station == station)
            .map(|entry| entry.key().pollutant.clone())
            .sorted_unstable()
            .dedup()
            .collect()
    }

    /// Snapshots of the specified keys, for persisting.
    pub fn snapshot<'a>(&self, keys: impl IntoIterator<Item = &'a Key>) -> Vec<(Key, Arc<History>)> {
        keys.into_iter().map(|key| (key.clone(), self.get(key))).collect()
    }

    /// Merges the reading of `date` into the key's history, creating the history if needed.
    #[cfg(test)]
    pub fn apply_day(&self, key: &Key, date: NaiveDate, value: f64) -> Result<(), InvariantViolation> {
        let history = self.merged(key, date, value)?;
        self.histories.insert(key.clone(), Arc::new(history));
        Ok(())
    }

    /// Ages the key's window forward. Unknown keys are left alone.
    #[cfg(test)]
    pub fn apply_no_reading_day(&self, key: &Key, date: NaiveDate) -> Result<(), InvariantViolation> {
        let Some(current) = self.histories.get(key).map(|history| Arc::clone(history.value())) else {
            return Ok(());
        };
        if let Some(history) = aged(key, &current, date)? {
            self.histories.insert(key.clone(), Arc::new(history));
        }
        Ok(())
    }

    /// Applies the whole day: the readings to their keys, and aging to every other known key.
    ///
    /// Nothing is published unless every new history is valid.
    #[instrument(level = "debug", skip_all, fields(%date, n_readings = readings.len()))]
    pub fn apply_batch(
        &self,
        date: NaiveDate,
        readings: AHashMap<Key, f64>,
    ) -> Result<BatchOutcome, InvariantViolation> {
        let mut staged = Vec::with_capacity(self.histories.len().max(readings.len()));
        let mut outcome = BatchOutcome::default();

        for entry in self.histories.iter() {
            if readings.contains_key(entry.key()) {
                continue;
            }
            if let Some(history) = aged(entry.key(), entry.value(), date)? {
                outcome.n_aged += 1;
                staged.push((entry.key().clone(), history));
            }
        }

        for (key, value) in readings {
            let history = self.merged(&key, date, value)?;
            outcome.n_updated += 1;
            staged.push((key, history));
        }

        outcome.touched.reserve(staged.len());
        for (key, history) in staged {
            outcome.touched.push(key.clone());
            self.histories.insert(key, Arc::new(history));
        }
        Ok(outcome)
    }

    /// Next version of the key's history with the reading merged in, unpublished.
    fn merged(&self, key: &Key, date: NaiveDate, value: f64) -> Result<History, InvariantViolation> {
        let mut history = History::clone(&self.get(key));
        history.apply_day(date, value).map_err(|source| InvariantViolation {
            key: key.clone(),
            source,
        })?;
        Ok(history)
    }
}

/// Next version of the history aged to `date`, or [`None`] when the window has not moved.
fn aged(key: &Key, current: &History, date: NaiveDate) -> Result<Option<History>, InvariantViolation> {
    let mut history = current.clone();
    history.apply_no_reading_day(date).map_err(|source| InvariantViolation {
        key: key.clone(),
        source,
    })?;
    Ok((history != *current).then_some(history))
}
