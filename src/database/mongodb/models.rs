pub use self::history::*;
pub use self::last_update::*;

mod history;
mod last_update;

use mongodb::bson;

use crate::prelude::*;

/// Calendar days are stored as UTC midnights.
fn to_bson_date(date: NaiveDate) -> Result<bson::DateTime> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("{} has no midnight", date))?;
    Ok(bson::DateTime::from_chrono(Utc.from_utc_datetime(&midnight)))
}

fn from_bson_date(date: bson::DateTime) -> NaiveDate {
    date.to_chrono().date_naive()
}
