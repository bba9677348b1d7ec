use mongodb::Database;

use self::models::{HistoryDocument, LastUpdate};
use self::traits::*;
use crate::database::{Snapshot, Storage};
use crate::models::{History, Key};
use crate::prelude::*;

pub mod models;
pub mod traits;

pub struct MongoStorage {
    database: Database,
}

impl MongoStorage {
    #[instrument(level = "debug", skip_all)]
    pub async fn open(uri: &str) -> Result<Self> {
        info!("connecting…");
        let client = mongodb::Client::with_uri_str(uri)
            .await
            .context("failed to parse the specified MongoDB URI")?;
        let database = client
            .default_database()
            .ok_or_else(|| anyhow!("MongoDB database name is not specified"))?;

        info!("ensuring indexes…");
        HistoryDocument::ensure_indexes(&database).await?;

        info!(database = database.name(), "connected");
        Ok(Self { database })
    }
}

#[async_trait]
impl Storage for MongoStorage {
    #[instrument(skip_all)]
    async fn load(&self) -> Result<Snapshot> {
        let histories = HistoryDocument::retrieve_all(&self.database)
            .await?
            .into_iter()
            .map(HistoryDocument::into_history)
            .collect::<Result<Vec<_>>>()?;
        let last_update = LastUpdate::retrieve(&self.database).await?;
        info!(n_histories = histories.len(), ?last_update, "loaded");
        Ok(Snapshot {
            histories,
            last_update,
        })
    }

    async fn save_histories(&self, histories: &[(Key, Arc<History>)]) -> Result {
        let documents = histories
            .iter()
            .map(|(key, history)| HistoryDocument::new(key, history))
            .collect::<Result<Vec<_>>>()?;
        HistoryDocument::upsert_many(documents, &self.database).await
    }

    async fn save_last_update(&self, date: NaiveDate) -> Result {
        LastUpdate::new(date)?.upsert(&self.database).await
    }
}
