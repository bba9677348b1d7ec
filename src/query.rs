//! Per-hour averages over the most recent days of a station's histories.

use serde::{Serialize, Serializer};

use crate::helpers::average::Average;
use crate::models::{DayKind, History, HistoryEntry, Hour, Key};
use crate::prelude::*;
use crate::store::HistoryStore;

/// Average of the entries dated within the last `n_days` days before `today`.
///
/// An entry qualifies when `today − entry.date ≤ n_days`. A history without
/// qualifying entries averages to `0.0`, and so does `n_days = 0`.
pub fn windowed_average(history: &History, today: NaiveDate, n_days: u16) -> f64 {
    windowed_average_by(history, today, n_days, |_| true)
}

/// Same as [`windowed_average`], but only the entries matching the predicate are averaged.
///
/// The window is still measured in calendar days.
pub fn windowed_average_by(
    history: &History,
    today: NaiveDate,
    n_days: u16,
    predicate: impl Fn(&HistoryEntry) -> bool,
) -> f64 {
    if n_days == 0 || history.is_empty() {
        return 0.0;
    }
    let mut average = Average::default();
    average.extend(
        history
            .iter()
            .rev()
            .take_while(|entry| (today - entry.date).num_days() <= i64::from(n_days))
            .filter(|entry| predicate(*entry))
            .map(|entry| entry.value),
    );
    average.average().unwrap_or_default()
}

/// Averages indexed by the hour of the day.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HourlyAverages([f64; Hour::N_HOURS]);

impl HourlyAverages {
    #[cfg(test)]
    pub fn get(&self, hour: Hour) -> f64 {
        self.0[hour.index()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl Serialize for HourlyAverages {
    fn serialize<S: Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        self.as_slice().serialize(serializer)
    }
}

/// Per-hour averages of the station and pollutant over the last `n_days` days.
///
/// Never fails: unknown keys and empty windows yield zeros.
#[instrument(level = "debug", skip(store))]
pub fn query(store: &HistoryStore, station: &str, pollutant: &str, n_days: u16, today: NaiveDate) -> HourlyAverages {
    hourly(store, station, pollutant, |history| windowed_average(history, today, n_days))
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct DailyProfile {
    pub working_days: HourlyAverages,
    pub weekends: HourlyAverages,
}

/// Like [`query`], but working days and weekends are averaged apart.
#[instrument(level = "debug", skip(store))]
pub fn daily_profile(
    store: &HistoryStore,
    station: &str,
    pollutant: &str,
    n_days: u16,
    today: NaiveDate,
) -> DailyProfile {
    let by_day_kind = |day_kind: DayKind| {
        hourly(store, station, pollutant, |history| {
            windowed_average_by(history, today, n_days, |entry| DayKind::of(entry.date) == day_kind)
        })
    };
    DailyProfile {
        working_days: by_day_kind(DayKind::WorkingDay),
        weekends: by_day_kind(DayKind::Weekend),
    }
}

fn hourly(
    store: &HistoryStore,
    station: &str,
    pollutant: &str,
    average: impl Fn(&History) -> f64,
) -> HourlyAverages {
    let mut averages = [0.0; Hour::N_HOURS];
    for hour in Hour::all() {
        averages[hour.index()] = average(&store.get(&Key::new(station, pollutant, hour)));
    }
    HourlyAverages(averages)
}
