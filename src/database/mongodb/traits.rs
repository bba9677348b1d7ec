use std::fmt::Debug;

use futures::{stream, StreamExt, TryStreamExt};
use mongodb::bson::Document;
use mongodb::options::{UpdateModifications, UpdateOptions, WriteConcern};
use mongodb::{Collection, Database, IndexModel};
use serde::de::DeserializeOwned;
use tokio::spawn;
use tokio::time::timeout;

use crate::helpers::tracing::format_elapsed;
use crate::prelude::*;

const UPSERT_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const WRITE_CONCERN_TIMEOUT: StdDuration = StdDuration::from_secs(5);

/// Concurrent upserts of a single [`Upsert::upsert_many`] call.
const MAX_CONCURRENT_UPSERTS: usize = 16;

pub trait TypedDocument: 'static + Sized + Send + Sync {
    const NAME: &'static str;

    #[inline]
    fn collection(in_: &Database) -> Collection<Self> {
        in_.collection(Self::NAME)
    }
}

#[async_trait]
pub trait Indexes: TypedDocument {
    type I: IntoIterator<Item = IndexModel> + Send;

    fn indexes() -> Self::I;

    #[instrument(skip_all, err)]
    async fn ensure_indexes(on: &Database) -> Result {
        Self::collection(on)
            .create_indexes(Self::indexes(), None)
            .await
            .with_context(|| format!("failed to create the indexes in `{}`", Self::NAME))?;
        Ok(())
    }
}

#[async_trait]
pub trait Upsert: TypedDocument {
    type Update: 'static + Into<UpdateModifications> + Debug + Send;

    fn query(&self) -> Document;

    fn update(&self) -> Result<Self::Update>;

    #[instrument(level = "debug", skip_all, fields(collection = Self::NAME))]
    async fn upsert(&self, to: &Database) -> Result {
        let query = self.query();
        let update = self.update()?;
        let options = Self::upsert_options();

        trace!(?query, ?update, "upserting…");
        let start_instant = Instant::now();
        let collection = Self::collection(to);
        let future = spawn(async move { collection.update_one(query, update, options).await });
        timeout(UPSERT_TIMEOUT, future)
            .await
            .with_context(|| format!("timed out to upsert into `{}`", Self::NAME))??
            .with_context(|| format!("failed to upsert into `{}`", Self::NAME))?;

        trace!(elapsed = ?start_instant.elapsed(), "upserted");
        Ok(())
    }

    #[instrument(skip_all, fields(collection = Self::NAME, n_documents = documents.len()))]
    async fn upsert_many(documents: Vec<Self>, to: &Database) -> Result {
        let start_instant = Instant::now();
        stream::iter(documents)
            .map(Ok::<_, anyhow::Error>)
            .try_for_each_concurrent(MAX_CONCURRENT_UPSERTS, |document| async move {
                document.upsert(to).await
            })
            .await?;
        debug!(elapsed = format_elapsed(start_instant).as_str(), "upserted");
        Ok(())
    }

    #[inline]
    fn upsert_options() -> UpdateOptions {
        let write_concern = WriteConcern::builder()
            .w_timeout(WRITE_CONCERN_TIMEOUT)
            .build();
        UpdateOptions::builder()
            .upsert(true)
            .write_concern(write_concern)
            .build()
    }
}

#[async_trait]
pub trait RetrieveAll: TypedDocument + DeserializeOwned + Unpin {
    #[instrument(skip_all, fields(collection = Self::NAME))]
    async fn retrieve_all(from: &Database) -> Result<Vec<Self>> {
        let start_instant = Instant::now();
        let documents: Vec<Self> = Self::collection(from)
            .find(None, None)
            .await
            .with_context(|| format!("failed to query `{}`", Self::NAME))?
            .try_collect()
            .await
            .with_context(|| format!("failed to retrieve `{}`", Self::NAME))?;
        debug!(
            n_documents = documents.len(),
            elapsed = format_elapsed(start_instant).as_str(),
            "retrieved",
        );
        Ok(documents)
    }
}
