use sentry::integrations::tracing::EventFilter;
use sentry::{ClientInitGuard, ClientOptions};
use tracing::{Level, Metadata, Subscriber};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::prelude::*;

const LOG_ENV: &str = "AIR_QUALITY_LOG";
const SENTRY_LOG_ENV: &str = "AIR_QUALITY_SENTRY_LOG";

/// Initialises Sentry and the tracing subscriber.
///
/// Keep the guard alive for the whole run, or the pending Sentry events are lost.
pub fn init(sentry_dsn: Option<String>, traces_sample_rate: f32) -> Result<ClientInitGuard> {
    let guard = sentry::init((
        sentry_dsn,
        ClientOptions {
            release: sentry::release_name!(),
            traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing_subscriber::registry()
        .with(sentry_layer()?)
        .with(format_layer()?)
        .try_init()
        .context("failed to initialise the tracing subscriber")?;

    Ok(guard)
}

/// Warnings and errors become Sentry events, everything else is a breadcrumb.
fn sentry_layer<S>() -> Result<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let filter = env_filter(SENTRY_LOG_ENV, "air_quality=debug")?;
    Ok(sentry::integrations::tracing::layer()
        .event_filter(event_filter)
        .span_filter(|metadata| metadata.level() <= &Level::INFO)
        .with_filter(filter))
}

fn format_layer<S>() -> Result<impl Layer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let filter = env_filter(LOG_ENV, "air_quality=info")?;
    Ok(tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter))
}

fn event_filter(metadata: &Metadata) -> EventFilter {
    match *metadata.level() {
        Level::ERROR | Level::WARN => EventFilter::Event,
        Level::INFO | Level::DEBUG | Level::TRACE => EventFilter::Breadcrumb,
    }
}

fn env_filter(variable: &str, default: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_env(variable)
        .or_else(|_| EnvFilter::try_new(default))
        .with_context(|| format!("invalid `{}`", variable))
}

pub fn format_duration(duration: StdDuration) -> String {
    humantime::format_duration(duration).to_string()
}

/// Elapsed time rounded to milliseconds.
pub fn format_elapsed(instant: Instant) -> String {
    let elapsed = instant.elapsed();
    format_duration(StdDuration::from_millis(elapsed.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_ok() {
        assert_eq!(format_duration(StdDuration::from_millis(61_500)), "1m 1s 500ms");
    }
}
