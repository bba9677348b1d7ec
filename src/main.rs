use clap::Parser;
use serde::Serialize;

use crate::feed::lcsqa::LcsqaFeed;
use crate::helpers::time::today;
use crate::opts::{Command, Opts, QueryOpts, StoreOpts};
use crate::prelude::*;
use crate::service::AirQuality;

mod database;
mod feed;
mod filter;
mod helpers;
mod ingestion;
mod models;
mod opts;
mod prelude;
mod query;
mod scheduler;
mod service;
mod store;
mod updater;

#[tokio::main]
async fn main() -> Result {
    let opts = Opts::parse();
    let _sentry_guard = helpers::tracing::init(opts.sentry_dsn, opts.traces_sample_rate)?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting…");

    let start_instant = Instant::now();
    let result = match opts.subcommand {
        Command::Run(opts) => {
            let air_quality = open(&opts.store).await?;
            updater::run(air_quality, opts.interval).await
        }
        Command::Update(opts) => {
            let air_quality = open(&opts.store).await?;
            let report = air_quality.trigger_catch_up(today()).await?;
            print_json(&report)
        }
        Command::Query(opts) => run_query(opts).await,
    };

    info!(elapsed = helpers::tracing::format_elapsed(start_instant).as_str(), "finished");
    result
}

async fn open(opts: &StoreOpts) -> Result<AirQuality> {
    let storage = database::open(opts.mongodb_uri.as_deref()).await?;
    let feed = LcsqaFeed::new(&opts.feed.base_url, opts.feed.timeout, opts.feed.n_attempts)?;
    AirQuality::open(storage, Arc::new(feed), opts.initial_days, today()).await
}

async fn run_query(opts: QueryOpts) -> Result {
    let air_quality = open(&opts.store).await?;
    let today = today();
    if opts.update {
        let _ = air_quality.update_if_stale(today).await?;
    } else if !air_quality.is_current(today) {
        warn!(last_update = %air_quality.last_update(), "the histories are stale");
    }
    if opts.by_day_kind {
        print_json(&air_quality.daily_profile(&opts.station, &opts.pollutant, opts.days, today)?)
    } else {
        print_json(&air_quality.query(&opts.station, &opts.pollutant, opts.days, today)?)
    }
}

fn print_json(value: &impl Serialize) -> Result {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
