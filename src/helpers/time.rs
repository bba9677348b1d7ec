//! Calendar day helpers.

use std::fmt::{Display, Formatter};

use crate::prelude::*;

/// Current calendar day.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[inline]
pub fn days_before(date: NaiveDate, n_days: i64) -> NaiveDate {
    date - Duration::days(n_days)
}

/// Half-open range of calendar days, `[start, end)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn n_days(&self) -> i64 {
        (self.end - self.start).num_days().max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl Display for DateRange {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "[{}, {})", self.start, self.end)
    }
}

impl IntoIterator for DateRange {
    type Item = NaiveDate;
    type IntoIter = Days;

    fn into_iter(self) -> Self::IntoIter {
        Days {
            next: self.start,
            end: self.end,
        }
    }
}

pub struct Days {
    next: NaiveDate,
    end: NaiveDate,
}

impl Iterator for Days {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let date = self.next;
        self.next = date.succ_opt()?;
        Some(date)
    }
}
