use thiserror::Error;

use crate::database::Storage;
use crate::feed::ReadingFeed;
use crate::ingestion::Pipeline;
use crate::models::WINDOW_DAYS;
use crate::prelude::*;
use crate::query::{daily_profile, query, DailyProfile, HourlyAverages};
use crate::scheduler::{initial_last_update, CatchUpReport, UpdateScheduler};
use crate::store::HistoryStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("the window may not exceed {window} days, got {0}", window = WINDOW_DAYS)]
    WindowTooLong(u16),

    #[error("station `{0}` is unknown")]
    UnknownStation(String),

    #[error("station `{station}` does not monitor `{pollutant}`")]
    PollutantNotMonitored { station: String, pollutant: String },
}

/// Loaded store with its scheduler, as used by the binary.
pub struct AirQuality {
    scheduler: UpdateScheduler,
}

impl AirQuality {
    /// Loads the persisted state, seeding the last update date on the very first start.
    #[instrument(skip_all, fields(%today, initial_days))]
    pub async fn open(
        storage: Arc<dyn Storage>,
        feed: Arc<dyn ReadingFeed>,
        initial_days: u16,
        today: NaiveDate,
    ) -> Result<Self> {
        let start_instant = Instant::now();
        let snapshot = storage.load().await.context("failed to load the histories")?;
        let last_update = match snapshot.last_update {
            Some(last_update) => last_update,
            None => {
                let last_update = initial_last_update(today, initial_days);
                info!(%last_update, "seeding the last update");
                storage.save_last_update(last_update).await?;
                last_update
            }
        };
        let ahead = snapshot.histories.iter().find(|(_, history)| {
            history.newest().map_or(false, |entry| entry.date > last_update)
        });
        if let Some((key, _)) = ahead {
            bail!("`{}` holds readings after the last update on {}", key, last_update);
        }

        let store = Arc::new(HistoryStore::from_histories(snapshot.histories));
        if store.is_empty() {
            info!("no histories yet, the first catch-up creates them");
        }
        info!(n_histories = store.len(), %last_update, elapsed = ?start_instant.elapsed(), "loaded");

        let pipeline = Pipeline::new(store, feed);
        Ok(Self {
            scheduler: UpdateScheduler::new(pipeline, storage, last_update),
        })
    }

    pub fn store(&self) -> &HistoryStore {
        self.scheduler.pipeline().store()
    }

    pub fn last_update(&self) -> NaiveDate {
        self.scheduler.last_update()
    }

    pub fn is_current(&self, today: NaiveDate) -> bool {
        self.scheduler.is_current(today)
    }

    pub async fn trigger_catch_up(&self, today: NaiveDate) -> Result<CatchUpReport> {
        self.scheduler.catch_up(today).await
    }

    /// Catches up unless the store is already current and saved. Cheap when it is.
    pub async fn update_if_stale(&self, today: NaiveDate) -> Result<Option<CatchUpReport>> {
        if self.is_current(today) && !self.scheduler.has_unsaved() {
            return Ok(None);
        }
        // Another caller may have caught up meanwhile, the scheduler then only flushes.
        let report = self.scheduler.catch_up(today).await?;
        Ok((!report.is_noop()).then_some(report))
    }

    pub fn monitored_pollutants(&self, station: &str) -> Vec<String> {
        self.store().monitored_pollutants(station)
    }

    pub fn query(
        &self,
        station: &str,
        pollutant: &str,
        n_days: u16,
        today: NaiveDate,
    ) -> Result<HourlyAverages, QueryError> {
        self.validate(station, pollutant, n_days)?;
        Ok(query(self.store(), station, pollutant, n_days, today))
    }

    pub fn daily_profile(
        &self,
        station: &str,
        pollutant: &str,
        n_days: u16,
        today: NaiveDate,
    ) -> Result<DailyProfile, QueryError> {
        self.validate(station, pollutant, n_days)?;
        Ok(daily_profile(self.store(), station, pollutant, n_days, today))
    }

    fn validate(&self, station: &str, pollutant: &str, n_days: u16) -> Result<(), QueryError> {
        if usize::from(n_days) > WINDOW_DAYS {
            return Err(QueryError::WindowTooLong(n_days));
        }
        if !self.store().has_station(station) {
            return Err(QueryError::UnknownStation(station.to_string()));
        }
        if !self.monitored_pollutants(station).iter().any(|monitored| monitored == pollutant) {
            return Err(QueryError::PollutantNotMonitored {
                station: station.to_string(),
                pollutant: pollutant.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryStorage;
    use crate::feed::fixture::StaticFeed;
    use crate::helpers::time::{days_before, DateRange};
    use crate::models::testing::date;
    use crate::models::Hour;

    async fn open(today: NaiveDate, n_days: i64) -> Result<(AirQuality, Arc<InMemoryStorage>)> {
        let storage = Arc::new(InMemoryStorage::default());
        let feed = StaticFeed::default().with_daily_readings(
            "FR04143",
            "O3",
            7,
            DateRange::new(days_before(today, n_days), today),
            |date| f64::from(date.day()),
        );
        let air_quality = AirQuality::open(Arc::clone(&storage) as Arc<dyn Storage>, Arc::new(feed), 30, today).await?;
        Ok((air_quality, storage))
    }

    #[tokio::test]
    async fn open_seeds_last_update_ok() -> Result {
        let today = date(2024, 6, 1);
        let (air_quality, storage) = open(today, 30).await?;
        assert_eq!(air_quality.last_update(), days_before(today, 31));
        assert_eq!(storage.last_update().await, Some(days_before(today, 31)));
        assert!(!air_quality.is_current(today));
        Ok(())
    }

    #[tokio::test]
    async fn update_if_stale_ok() -> Result {
        let today = date(2024, 6, 1);
        let (air_quality, _) = open(today, 30).await?;

        let report = air_quality.update_if_stale(today).await?;
        assert_eq!(report.map(|report| report.days.len()), Some(30));
        assert!(air_quality.is_current(today));
        assert!(air_quality.update_if_stale(today).await?.is_none());
        assert!(air_quality.trigger_catch_up(today).await?.is_noop());
        Ok(())
    }

    #[tokio::test]
    async fn update_if_stale_saves_after_failure_ok() -> Result {
        let today = date(2024, 6, 1);
        let storage = Arc::new(InMemoryStorage::default());
        let feed = StaticFeed::default().with_daily_readings(
            "FR04143",
            "O3",
            7,
            DateRange::new(days_before(today, 1), today),
            |date| f64::from(date.day()),
        );
        let air_quality = AirQuality::open(Arc::clone(&storage) as Arc<dyn Storage>, Arc::new(feed), 1, today).await?;
        let key = crate::models::Key::new("FR04143", "O3", Hour::try_from(7_u32)?);

        storage.fail_next_saves(1);
        assert!(air_quality.update_if_stale(today).await.is_err());
        assert!(air_quality.is_current(today));
        assert_eq!(storage.history(&key).await, None);

        assert!(air_quality.update_if_stale(today).await?.is_none());
        assert_eq!(storage.history(&key).await.map(|history| history.len()), Some(1));
        assert!(air_quality.update_if_stale(today).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn reopen_restores_state_ok() -> Result {
        let today = date(2024, 6, 1);
        let (air_quality, storage) = open(today, 30).await?;
        let _ = air_quality.trigger_catch_up(today).await?;

        let reopened = AirQuality::open(storage, Arc::new(StaticFeed::default()), 30, today).await?;
        assert!(reopened.is_current(today));
        assert_eq!(reopened.store().len(), 1);
        assert_eq!(reopened.query("FR04143", "O3", 7, today)?, air_quality.query("FR04143", "O3", 7, today)?);
        Ok(())
    }

    #[tokio::test]
    async fn histories_ahead_of_last_update_is_error_ok() -> Result {
        let today = date(2024, 6, 1);
        let storage = Arc::new(InMemoryStorage::default());
        let key = crate::models::Key::new("FR04143", "O3", Hour::try_from(7_u32)?);
        let history = crate::models::testing::dense_history(today, 3);
        storage.save_histories(&[(key, Arc::new(history))]).await?;
        storage.save_last_update(days_before(today, 5)).await?;

        assert!(AirQuality::open(storage, Arc::new(StaticFeed::default()), 30, today).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn query_ok() -> Result {
        let today = date(2024, 6, 1);
        let (air_quality, _) = open(today, 30).await?;
        let _ = air_quality.trigger_catch_up(today).await?;

        // Readings of May 29 to 31.
        let averages = air_quality.query("FR04143", "O3", 3, today)?;
        assert_eq!(averages.get(Hour::try_from(7_u32)?), 30.0);
        assert_eq!(averages.get(Hour::try_from(8_u32)?), 0.0);

        let profile = air_quality.daily_profile("FR04143", "O3", 3, today)?;
        assert_eq!(profile.working_days.get(Hour::try_from(7_u32)?), 30.0);
        Ok(())
    }

    #[tokio::test]
    async fn query_validation_ok() -> Result {
        let today = date(2024, 6, 1);
        let (air_quality, _) = open(today, 30).await?;
        let _ = air_quality.trigger_catch_up(today).await?;

        assert_eq!(air_quality.query("FR04143", "O3", 181, today), Err(QueryError::WindowTooLong(181)));
        assert_eq!(
            air_quality.query("FR99999", "O3", 7, today),
            Err(QueryError::UnknownStation("FR99999".to_string())),
        );
        assert_eq!(
            air_quality.query("FR04143", "SO2", 7, today),
            Err(QueryError::PollutantNotMonitored {
                station: "FR04143".to_string(),
                pollutant: "SO2".to_string(),
            }),
        );
        assert_eq!(air_quality.monitored_pollutants("FR04143"), ["O3"]);
        Ok(())
    }
}
