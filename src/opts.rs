//! CLI options.

use clap::{Args, Parser, Subcommand};

use crate::feed::lcsqa::DEFAULT_BASE_URL;
use crate::prelude::*;
use crate::scheduler::DEFAULT_INITIAL_DAYS;

pub mod parsers;

#[derive(Parser)]
#[command(author, version, about, long_about = None, propagate_version = true)]
pub struct Opts {
    /// Sentry DSN
    #[arg(short, long, env = "AIR_QUALITY_SENTRY_DSN")]
    pub sentry_dsn: Option<String>,

    /// Performance monitoring sample rate for Sentry
    #[arg(long, default_value = "0", env = "AIR_QUALITY_TRACES_SAMPLE_RATE")]
    pub traces_sample_rate: f32,

    #[command(subcommand)]
    pub subcommand: Command,
}

#[derive(Subcommand)]
pub enum Command {
    Run(RunOpts),
    Update(UpdateOpts),
    Query(QueryOpts),
}

/// Runs the updater, which keeps the histories complete through yesterday
#[derive(Args)]
pub struct RunOpts {
    #[command(flatten)]
    pub store: StoreOpts,

    /// How often to check whether the histories are current
    #[arg(long, default_value = "1h", value_parser = humantime::parse_duration, env = "AIR_QUALITY_UPDATE_INTERVAL")]
    pub interval: StdDuration,
}

/// Catches the histories up once and prints the report
#[derive(Args)]
pub struct UpdateOpts {
    #[command(flatten)]
    pub store: StoreOpts,
}

/// Prints the hourly averages of a station's pollutant
#[derive(Args)]
pub struct QueryOpts {
    #[command(flatten)]
    pub store: StoreOpts,

    /// Station code, for example `FR04143`
    #[arg(long, value_parser = parsers::station_code)]
    pub station: String,

    /// Pollutant code, for example `O3`
    #[arg(long)]
    pub pollutant: String,

    /// Number of the most recent days to average
    #[arg(long, default_value = "7", value_parser = parsers::window_days)]
    pub days: u16,

    /// Split the averages into working days and weekends
    #[arg(long)]
    pub by_day_kind: bool,

    /// Catch the histories up before querying, when stale
    #[arg(long)]
    pub update: bool,
}

/// Everything needed to load and update the histories.
#[derive(Args)]
pub struct StoreOpts {
    /// MongoDB URI, the histories are kept in memory only when omitted
    #[arg(long, env = "AIR_QUALITY_MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// Number of days to backfill on the very first start
    #[arg(
        long,
        default_value_t = DEFAULT_INITIAL_DAYS,
        value_parser = parsers::window_days,
        env = "AIR_QUALITY_INITIAL_DAYS",
    )]
    pub initial_days: u16,

    #[command(flatten)]
    pub feed: FeedOpts,
}

#[derive(Args)]
pub struct FeedOpts {
    /// Base URL of the daily real-time files
    #[arg(long = "feed-base-url", default_value = DEFAULT_BASE_URL, env = "AIR_QUALITY_FEED_BASE_URL")]
    pub base_url: String,

    /// Timeout of a single file download
    #[arg(long = "feed-timeout", default_value = "2m", value_parser = humantime::parse_duration)]
    pub timeout: StdDuration,

    /// Number of attempts to download a file before the day becomes a gap
    #[arg(long = "feed-n-attempts", default_value = "3", value_parser = parsers::non_zero_u32)]
    pub n_attempts: u32,
}
