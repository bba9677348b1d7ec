use mongodb::bson::{doc, Document};
use mongodb::{bson, Database};
use serde::{Deserialize, Serialize};

use super::{from_bson_date, to_bson_date};
use crate::database::mongodb::traits::*;
use crate::prelude::*;

/// The date through which the histories are complete.
#[derive(Serialize, Deserialize, Debug)]
pub struct LastUpdate {
    #[serde(rename = "_id")]
    id: String,

    #[serde(rename = "d")]
    date: bson::DateTime,
}

impl LastUpdate {
    const ID: &'static str = "last_update";

    pub fn new(date: NaiveDate) -> Result<Self> {
        Ok(Self {
            id: Self::ID.to_string(),
            date: to_bson_date(date)?,
        })
    }

    pub fn date(&self) -> NaiveDate {
        from_bson_date(self.date)
    }

    #[instrument(skip_all, err)]
    pub async fn retrieve(from: &Database) -> Result<Option<NaiveDate>> {
        let this = Self::collection(from)
            .find_one(doc! { "_id": Self::ID }, None)
            .await
            .context("failed to retrieve the last update")?;
        Ok(this.map(|this| this.date()))
    }
}

impl TypedDocument for LastUpdate {
    const NAME: &'static str = "last_update";
}

impl Upsert for LastUpdate {
    type Update = Document;

    fn query(&self) -> Document {
        doc! { "_id": self.id.as_str() }
    }

    fn update(&self) -> Result<Self::Update> {
        Ok(doc! { "$set": { "d": self.date } })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::date;

    #[test]
    fn date_round_trip_ok() -> Result {
        let last_update = LastUpdate::new(date(2024, 2, 29))?;
        assert_eq!(last_update.date(), date(2024, 2, 29));
        assert_eq!(last_update.update()?, doc! { "$set": { "d": to_bson_date(date(2024, 2, 29))? } });
        Ok(())
    }
}
