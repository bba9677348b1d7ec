use mongodb::bson::{doc, Document};
use mongodb::{bson, IndexModel};
use serde::{Deserialize, Serialize};

use super::{from_bson_date, to_bson_date};
use crate::database::mongodb::traits::*;
use crate::models::{History, HistoryEntry, Hour, Key};
use crate::prelude::*;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HistoryId {
    #[serde(rename = "s")]
    pub station: String,

    #[serde(rename = "p")]
    pub pollutant: String,

    #[serde(rename = "hr")]
    pub hour: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EntryDocument {
    #[serde(rename = "d")]
    pub date: bson::DateTime,

    #[serde(rename = "v")]
    pub value: f64,
}

/// One rolling history per document.
#[derive(Serialize, Deserialize, Debug)]
pub struct HistoryDocument {
    #[serde(rename = "_id")]
    pub id: HistoryId,

    #[serde(rename = "h")]
    pub entries: Vec<EntryDocument>,
}

impl HistoryDocument {
    pub fn new(key: &Key, history: &History) -> Result<Self> {
        let mut entries = Vec::with_capacity(history.len());
        for entry in history.iter() {
            entries.push(EntryDocument {
                date: to_bson_date(entry.date)?,
                value: entry.value,
            });
        }
        Ok(Self {
            id: HistoryId {
                station: key.station.clone(),
                pollutant: key.pollutant.clone(),
                hour: i32::from(key.hour.get()),
            },
            entries,
        })
    }

    /// Validates the stored history, so that a corrupted document cannot break the store.
    pub fn into_history(self) -> Result<(Key, History)> {
        let hour = u32::try_from(self.id.hour)
            .map_err(anyhow::Error::from)
            .and_then(Hour::try_from)
            .with_context(|| format!("invalid hour in `{:?}`", self.id))?;
        let key = Key::new(self.id.station, self.id.pollutant, hour);
        let history = History::from_entries(
            self.entries
                .into_iter()
                .map(|entry| HistoryEntry::new(from_bson_date(entry.date), entry.value)),
        )
        .with_context(|| format!("`{}` is corrupted", key))?;
        Ok((key, history))
    }
}

impl TypedDocument for HistoryDocument {
    const NAME: &'static str = "histories";
}

impl Indexes for HistoryDocument {
    type I = [IndexModel; 1];

    fn indexes() -> Self::I {
        [IndexModel::builder()
            .keys(doc! { "_id.s": 1, "_id.p": 1 })
            .build()]
    }
}

impl Upsert for HistoryDocument {
    type Update = Document;

    fn query(&self) -> Document {
        doc! { "_id": { "s": self.id.station.as_str(), "p": self.id.pollutant.as_str(), "hr": self.id.hour } }
    }

    fn update(&self) -> Result<Self::Update> {
        Ok(doc! { "$set": { "h": bson::to_bson(&self.entries)? } })
    }
}

impl RetrieveAll for HistoryDocument {}
