//! Keeps the store complete through yesterday.
//!
//! Every completed day is a checkpoint: the last update date is persisted
//! before the histories it produced, so a crash may lose the last day's
//! history writes but never makes a day apply twice.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use futures::TryStreamExt;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::database::Storage;
use crate::filter::FilterReport;
use crate::helpers::time::{days_before, DateRange};
use crate::helpers::tracing::format_elapsed;
use crate::ingestion::{DayReport, Pipeline};
use crate::models::{Key, WINDOW_DAYS};
use crate::prelude::*;

pub const DEFAULT_INITIAL_DAYS: u16 = WINDOW_DAYS as u16;

/// Last update date for a store which has never been updated,
/// so that the first catch-up backfills `initial_days` days.
pub fn initial_last_update(today: NaiveDate, initial_days: u16) -> NaiveDate {
    days_before(today, i64::from(initial_days) + 1)
}

#[must_use]
#[derive(Debug, Default, Serialize)]
pub struct CatchUpReport {
    pub days: Vec<DayReport>,
    pub filter: FilterReport,
}

impl CatchUpReport {
    fn push(&mut self, day: DayReport) {
        self.filter.merge(&day.filter);
        self.days.push(day);
    }

    pub fn is_noop(&self) -> bool {
        self.days.is_empty()
    }

    pub fn gaps(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.iter().filter(|day| day.is_gap()).map(|day| day.date)
    }
}

/// Writes which have not reached the storage yet.
#[derive(Default)]
struct Unsaved {
    last_update: Option<NaiveDate>,
    keys: AHashSet<Key>,
}

pub struct UpdateScheduler {
    pipeline: Pipeline,
    storage: Arc<dyn Storage>,

    /// Days since the Common Era, see [`NaiveDate::num_days_from_ce`].
    last_update: AtomicI32,

    /// Held for the whole catch-up.
    catch_up_lock: Mutex<Unsaved>,

    /// Set while [`Unsaved`] holds anything, readable without the lock.
    has_unsaved: AtomicBool,
}

impl UpdateScheduler {
    pub fn new(pipeline: Pipeline, storage: Arc<dyn Storage>, last_update: NaiveDate) -> Self {
        Self {
            pipeline,
            storage,
            last_update: AtomicI32::new(last_update.num_days_from_ce()),
            catch_up_lock: Mutex::default(),
            has_unsaved: AtomicBool::new(false),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn last_update(&self) -> NaiveDate {
        // Only ever set from a valid date.
        NaiveDate::from_num_days_from_ce_opt(self.last_update.load(Ordering::Acquire)).unwrap_or_default()
    }

    fn set_last_update(&self, date: NaiveDate) {
        self.last_update.store(date.num_days_from_ce(), Ordering::Release);
    }

    /// Whether a failed save is waiting for the next catch-up.
    pub fn has_unsaved(&self) -> bool {
        self.has_unsaved.load(Ordering::Acquire)
    }

    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.last_update() >= days_before(today, 1)
    }

    /// Days to ingest, never reaching further back than the window.
    pub fn catch_up_range(&self, today: NaiveDate) -> Option<DateRange> {
        let start = (self.last_update() + Duration::days(1)).max(days_before(today, WINDOW_DAYS as i64));
        let range = DateRange::new(start, today);
        (!range.is_empty()).then_some(range)
    }

    /// Brings the store up to yesterday.
    ///
    /// Concurrent calls are serialized: a late caller finds nothing left to do.
    /// An invariant violation aborts the catch-up with the error.
    #[instrument(skip_all, fields(%today))]
    pub async fn catch_up(&self, today: NaiveDate) -> Result<CatchUpReport> {
        let mut unsaved = self.catch_up_lock.lock().await;
        self.flush(&mut unsaved).await?;

        let mut report = CatchUpReport::default();
        let Some(range) = self.catch_up_range(today) else {
            debug!(last_update = %self.last_update(), "already up to date");
            return Ok(report);
        };

        info!(%range, n_days = range.n_days(), "catching up…");
        let start_instant = Instant::now();
        let mut days = Box::pin(self.pipeline.ingest(range));
        while let Some(day) = days.try_next().await? {
            self.set_last_update(day.date);
            unsaved.last_update = Some(day.date);
            unsaved.keys.extend(day.touched.iter().cloned());
            self.has_unsaved.store(true, Ordering::Release);
            self.flush(&mut unsaved).await?;
            report.push(day);
        }

        let gaps: Vec<NaiveDate> = report.gaps().collect();
        if !gaps.is_empty() {
            warn!(?gaps, "some days were unavailable and will not be retried");
        }
        info!(
            n_days = report.days.len(),
            n_gaps = gaps.len(),
            n_accepted = report.filter.n_accepted,
            n_rejected = report.filter.n_rejected(),
            elapsed = format_elapsed(start_instant).as_str(),
            "caught up",
        );
        Ok(report)
    }

    /// Persists the pending writes, the last update date first.
    async fn flush(&self, unsaved: &mut Unsaved) -> Result {
        if let Some(date) = unsaved.last_update {
            self.storage
                .save_last_update(date)
                .await
                .context("failed to save the last update date")?;
            unsaved.last_update = None;
        }
        if !unsaved.keys.is_empty() {
            let histories = self.pipeline.store().snapshot(unsaved.keys.iter());
            self.storage
                .save_histories(&histories)
                .await
                .with_context(|| format!("failed to save {} histories", histories.len()))?;
            unsaved.keys.clear();
        }
        self.has_unsaved.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStorage;
    use crate::feed::fixture::StaticFeed;
    use crate::feed::ReadingFeed;
    use crate::models::testing::date;
    use crate::models::Hour;
    use crate::store::{HistoryStore, InvariantViolation};

    fn scheduler(feed: StaticFeed, storage: Arc<InMemoryStorage>, last_update: NaiveDate) -> UpdateScheduler {
        let pipeline = Pipeline::new(Arc::new(HistoryStore::default()), Arc::new(feed));
        UpdateScheduler::new(pipeline, storage, last_update)
    }

    fn key() -> Key {
        Key::new("FR04143", "O3", Hour::try_from(7_u32).expect("valid test hour"))
    }

    fn daily_feed(dates: DateRange) -> StaticFeed {
        StaticFeed::default().with_daily_readings("FR04143", "O3", 7, dates, |date| f64::from(date.day()))
    }

    #[test]
    fn catch_up_range_is_clamped_to_window_ok() {
        let today = date(2024, 6, 1);
        let scheduler = scheduler(StaticFeed::default(), Arc::default(), date(2020, 1, 1));
        let range = scheduler.catch_up_range(today);
        assert_eq!(range, Some(DateRange::new(days_before(today, 180), today)));
        assert_eq!(range.map(|range| range.n_days()), Some(180));
    }

    #[test]
    fn initial_last_update_ok() {
        let today = date(2024, 6, 1);
        let scheduler = scheduler(StaticFeed::default(), Arc::default(), initial_last_update(today, 10));
        assert_eq!(
            scheduler.catch_up_range(today),
            Some(DateRange::new(days_before(today, 10), today)),
        );
    }

    #[tokio::test]
    async fn catch_up_ok() -> Result {
        let today = date(2024, 6, 1);
        let storage = Arc::new(InMemoryStorage::default());
        let feed = daily_feed(DateRange::new(days_before(today, 9), today));
        let scheduler = scheduler(feed, Arc::clone(&storage), days_before(today, 10));

        assert!(!scheduler.is_current(today));
        let report = scheduler.catch_up(today).await?;

        let dates: Vec<NaiveDate> = report.days.iter().map(|day| day.date).collect();
        let expected: Vec<NaiveDate> = DateRange::new(days_before(today, 9), today).into_iter().collect();
        assert_eq!(dates, expected);
        assert_eq!(report.gaps().count(), 0);
        assert_eq!(scheduler.last_update(), days_before(today, 1));
        assert!(scheduler.is_current(today));
        assert_eq!(scheduler.pipeline().store().get(&key()).len(), 9);

        assert_eq!(storage.last_update().await, Some(days_before(today, 1)));
        assert_eq!(storage.history(&key()).await.map(|history| history.len()), Some(9));
        Ok(())
    }

    #[tokio::test]
    async fn gap_is_skipped_and_not_retried_ok() -> Result {
        let today = date(2024, 6, 1);
        let gap = days_before(today, 5);
        let dates = DateRange::new(days_before(today, 9), today).into_iter().filter(|date| *date != gap);
        let feed = Arc::new(
            StaticFeed::default().with_daily_readings("FR04143", "O3", 7, dates, |date| f64::from(date.day())),
        );
        let pipeline = Pipeline::new(Arc::new(HistoryStore::default()), Arc::clone(&feed) as Arc<dyn ReadingFeed>);
        let scheduler = UpdateScheduler::new(pipeline, Arc::new(InMemoryStorage::default()), days_before(today, 10));

        let report = scheduler.catch_up(today).await?;
        assert_eq!(report.gaps().collect::<Vec<_>>(), [gap]);
        assert_eq!(scheduler.last_update(), days_before(today, 1));
        assert_eq!(scheduler.pipeline().store().get(&key()).len(), 8);
        assert_eq!(feed.n_fetches(), 9);

        let report = scheduler.catch_up(today).await?;
        assert!(report.is_noop());
        assert_eq!(feed.n_fetches(), 9);
        Ok(())
    }

    #[tokio::test]
    async fn current_store_is_noop_ok() -> Result {
        let today = date(2024, 6, 1);
        let feed = daily_feed(DateRange::new(days_before(today, 9), today));
        let scheduler = scheduler(feed, Arc::default(), days_before(today, 1));

        assert!(scheduler.is_current(today));
        assert!(scheduler.catch_up(today).await?.is_noop());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_catch_ups_apply_once_ok() -> Result {
        let today = date(2024, 6, 1);
        let feed = daily_feed(DateRange::new(days_before(today, 9), today));
        let scheduler = scheduler(feed, Arc::default(), days_before(today, 10));

        let (first, second) = tokio::join!(scheduler.catch_up(today), scheduler.catch_up(today));
        assert_eq!(first?.days.len() + second?.days.len(), 9);
        assert_eq!(scheduler.pipeline().store().get(&key()).len(), 9);
        Ok(())
    }

    #[tokio::test]
    async fn failed_save_is_retried_ok() -> Result {
        let today = date(2024, 6, 1);
        let storage = Arc::new(InMemoryStorage::default());
        let feed = daily_feed(DateRange::new(days_before(today, 3), today));
        let scheduler = scheduler(feed, Arc::clone(&storage), days_before(today, 4));

        storage.fail_next_saves(1);
        assert!(scheduler.catch_up(today).await.is_err());
        assert_eq!(scheduler.last_update(), days_before(today, 3));
        assert_eq!(storage.last_update().await, Some(days_before(today, 3)));
        assert_eq!(storage.history(&key()).await, None);
        assert!(scheduler.has_unsaved());

        let report = scheduler.catch_up(today).await?;
        assert_eq!(report.days.len(), 2);
        assert!(!scheduler.has_unsaved());
        assert_eq!(scheduler.last_update(), days_before(today, 1));
        assert_eq!(storage.history(&key()).await.map(|history| history.len()), Some(3));
        Ok(())
    }

    #[tokio::test]
    async fn invariant_violation_aborts_ok() -> Result {
        let today = date(2024, 6, 1);
        let feed = daily_feed(DateRange::new(days_before(today, 3), today));
        let pipeline = Pipeline::new(Arc::new(HistoryStore::default()), Arc::new(feed));
        // Already holds a day later than the first one to ingest.
        pipeline.store().apply_day(&key(), days_before(today, 2), 1.0)?;
        let scheduler = UpdateScheduler::new(pipeline, Arc::new(InMemoryStorage::default()), days_before(today, 4));

        let error = scheduler.catch_up(today).await.unwrap_err();
        assert!(error.downcast_ref::<InvariantViolation>().is_some());
        assert_eq!(scheduler.last_update(), days_before(today, 4));
        Ok(())
    }
}
