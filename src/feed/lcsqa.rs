//! Daily real-time files published by the LCSQA on `data.gouv.fr`.

use reqwest::StatusCode;

use crate::feed::ReadingFeed;
use crate::helpers::backoff::Backoff;
use crate::models::RawReading;
use crate::prelude::*;

pub const DEFAULT_BASE_URL: &str =
    "https://files.data.gouv.fr/lcsqa/concentrations-de-polluants-atmospheriques-reglementes/temps-reel";

const SEPARATOR: char = ';';

const STATION_COLUMN: &str = "code site";
const POLLUTANT_COLUMN: &str = "Polluant";
const VALUE_COLUMN: &str = "valeur brute";
const VALIDITY_COLUMN: &str = "validité";
const TIMESTAMP_COLUMN: &str = "Date de début";

#[derive(Clone)]
pub struct LcsqaFeed {
    client: reqwest::Client,
    base_url: Arc<String>,
    n_attempts: u32,
}

impl LcsqaFeed {
    pub fn new(base_url: &str, timeout: StdDuration, n_attempts: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build the HTTP client")?;
        Ok(Self {
            client,
            base_url: Arc::new(base_url.trim_end_matches('/').to_string()),
            n_attempts: n_attempts.max(1),
        })
    }

    pub fn day_url(&self, date: NaiveDate) -> String {
        format!("{}/{}/FR_E2_{}.csv", self.base_url, date.year(), date)
    }

    /// Downloads the day's file, [`None`] if it has not been published.
    #[instrument(level = "debug", skip_all, fields(%date))]
    async fn download(&self, date: NaiveDate) -> Result<Option<String>> {
        let url = self.day_url(date);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to request `{}`", url))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response
            .error_for_status()
            .with_context(|| format!("`{}` has failed", url))?
            .text()
            .await
            .with_context(|| format!("failed to read `{}`", url))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl ReadingFeed for LcsqaFeed {
    #[instrument(skip_all, fields(%date))]
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<RawReading>> {
        let start_instant = Instant::now();
        let body = Backoff::new(1000, 30000)
            .retry(self.n_attempts, move || self.download(date))
            .await?
            .ok_or_else(|| anyhow!("the file for {} is not published", date))?;
        let readings = parse_daily_file(&body)
            .with_context(|| format!("failed to parse the file for {}", date))?;
        debug!(n_readings = readings.len(), elapsed = ?start_instant.elapsed(), "fetched");
        Ok(readings)
    }
}

/// Parses the `;`-separated daily file. Columns are looked up by their header.
///
/// A row too short to hold a column yields empty fields, which the filter rejects.
/// Fields may be double-quoted, a quoted separator does not split the field.
pub fn parse_daily_file(body: &str) -> Result<Vec<RawReading>> {
    let mut lines = body.lines();
    let header = lines.next().ok_or_else(|| anyhow!("the file is empty"))?;
    let columns = Columns::from_header(header.trim_start_matches('\u{feff}'))?;
    Ok(lines
        .filter(|line| !line.trim().is_empty())
        .map(|line| columns.parse_row(line))
        .collect())
}

struct Columns {
    station: usize,
    pollutant: usize,
    value: usize,
    validity: usize,
    timestamp: usize,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self> {
        let names: Vec<&str> = split_fields(header).map(clean_field).collect();
        let index_of = |name: &str| {
            names
                .iter()
                .position(|column| *column == name)
                .ok_or_else(|| anyhow!("column `{}` is missing", name))
        };
        Ok(Self {
            station: index_of(STATION_COLUMN)?,
            pollutant: index_of(POLLUTANT_COLUMN)?,
            value: index_of(VALUE_COLUMN)?,
            validity: index_of(VALIDITY_COLUMN)?,
            timestamp: index_of(TIMESTAMP_COLUMN)?,
        })
    }

    fn parse_row(&self, line: &str) -> RawReading {
        let fields: Vec<&str> = split_fields(line).map(clean_field).collect();
        let field = |index: usize| fields.get(index).copied().unwrap_or_default();
        RawReading {
            station: field(self.station).to_string(),
            pollutant: field(self.pollutant).to_string(),
            is_valid: field(self.validity).parse::<i32>() == Ok(1),
            raw_value: field(self.value)
                .replace(',', ".")
                .parse()
                .unwrap_or(f64::NAN),
            timestamp: field(self.timestamp).to_string(),
        }
    }
}

/// Splits the row on the separators outside double quotes.
fn split_fields(line: &str) -> impl Iterator<Item = &str> {
    let mut is_quoted = false;
    line.split(move |char_| {
        if char_ == '"' {
            is_quoted = !is_quoted;
        }
        char_ == SEPARATOR && !is_quoted
    })
}

fn clean_field(field: &str) -> &str {
    field.trim().trim_matches('"')
}
