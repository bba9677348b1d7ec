use std::collections::vec_deque;
use std::collections::VecDeque;

use itertools::Itertools;
use thiserror::Error;

use crate::prelude::*;

/// Retention window, in days. A history never holds more entries than this.
pub const WINDOW_DAYS: usize = 180;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub value: f64,
}

impl HistoryEntry {
    pub const fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Broken history invariant. Only a sequencing bug in the caller can cause it.
#[derive(Debug, Error, PartialEq)]
pub enum HistoryError {
    #[error("history holds {0} entries, the window is {window} days", window = WINDOW_DAYS)]
    Overflow(usize),

    #[error("history dates are not strictly increasing: {previous} is followed by {next}")]
    NonMonotonic {
        previous: NaiveDate,
        next: NaiveDate,
    },
}

/// Date-ordered readings of a single key, oldest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
}

impl History {
    /// Builds a history from already ordered entries, e.g. loaded from storage.
    pub fn from_entries(entries: impl IntoIterator<Item = HistoryEntry>) -> Result<Self, HistoryError> {
        let this = Self {
            entries: entries.into_iter().collect(),
        };
        this.check_invariants()?;
        Ok(this)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn is_window_full(&self) -> bool {
        self.entries.len() == WINDOW_DAYS
    }

    /// Iterates oldest to newest. Reverse it to walk from the most recent day.
    pub fn iter(&self) -> vec_deque::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }

    pub fn oldest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn newest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Merges the reading of `date` into the history.
    ///
    /// Entries which fall out of the window relative to `date` are evicted first.
    /// Then, a full window drops its oldest entry before the new one is appended,
    /// so the length never exceeds [`WINDOW_DAYS`].
    ///
    /// Must be called at most once per day and in increasing date order.
    pub fn apply_day(&mut self, date: NaiveDate, value: f64) -> Result<(), HistoryError> {
        self.evict_expired(date);
        if self.is_window_full() {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry::new(date, value));
        self.check_invariants()
    }

    /// Ages the window forward for a day without a reading.
    pub fn apply_no_reading_day(&mut self, date: NaiveDate) -> Result<(), HistoryError> {
        self.evict_expired(date);
        if self.is_window_full() {
            self.entries.pop_front();
        }
        self.check_invariants()
    }

    /// Drops the entries dated `date − WINDOW_DAYS` and earlier.
    fn evict_expired(&mut self, date: NaiveDate) {
        while let Some(oldest) = self.oldest() {
            if (date - oldest.date).num_days() >= WINDOW_DAYS as i64 {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn check_invariants(&self) -> Result<(), HistoryError> {
        if self.entries.len() > WINDOW_DAYS {
            return Err(HistoryError::Overflow(self.entries.len()));
        }
        match self
            .entries
            .iter()
            .tuple_windows()
            .find(|(previous, next)| previous.date >= next.date)
        {
            Some((previous, next)) => Err(HistoryError::NonMonotonic {
                previous: previous.date,
                next: next.date,
            }),
            None => Ok(()),
        }
    }
}
