use tokio::time::{interval, MissedTickBehavior};

use crate::helpers::time::today;
use crate::prelude::*;
use crate::service::AirQuality;
use crate::store::InvariantViolation;

/// Periodically catches the store up until interrupted.
///
/// Failures are retried on the next tick, except for a broken history invariant.
#[instrument(skip_all, fields(period = ?period))]
pub async fn run(air_quality: AirQuality, period: StdDuration) -> Result {
    sentry::configure_scope(|scope| scope.set_tag("app", "updater"));

    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(last_update = %air_quality.last_update(), "running…");
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for the interrupt signal")?;
                info!("interrupted");
                return Ok(());
            }
        }

        match air_quality.update_if_stale(today()).await {
            Ok(Some(report)) => {
                info!(n_days = report.days.len(), n_gaps = report.gaps().count(), "updated");
            }
            Ok(None) => {
                debug!("up to date");
            }
            Err(error) if error.downcast_ref::<InvariantViolation>().is_some() => {
                error!("stopping: {:#}", error);
                sentry::integrations::anyhow::capture_anyhow(&error);
                return Err(error);
            }
            Err(error) => {
                error!("failed to update, retrying on the next tick: {:#}", error);
            }
        }
    }
}
