//! Persistence of the histories and the last update date across restarts.

#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use crate::models::{History, Key};
use crate::prelude::*;

pub mod mongodb;

/// Everything persisted, as loaded on start.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub histories: Vec<(Key, History)>,
    pub last_update: Option<NaiveDate>,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn load(&self) -> Result<Snapshot>;

    /// Replaces the persisted histories of the keys.
    async fn save_histories(&self, histories: &[(Key, Arc<History>)]) -> Result;

    async fn save_last_update(&self, date: NaiveDate) -> Result;
}

/// Connects to MongoDB, or falls back to the in-memory storage when no URI is given.
pub async fn open(uri: Option<&str>) -> Result<Arc<dyn Storage>> {
    match uri {
        Some(uri) => Ok(Arc::new(self::mongodb::MongoStorage::open(uri).await?)),
        None => {
            warn!("no MongoDB URI is specified, the histories will not survive a restart");
            Ok(Arc::new(InMemoryStorage::default()))
        }
    }
}

/// Storage which lives as long as the process.
#[derive(Default)]
pub struct InMemoryStorage {
    state: Mutex<InMemoryState>,

    #[cfg(test)]
    n_failing_saves: AtomicUsize,
}

#[derive(Default)]
struct InMemoryState {
    histories: AHashMap<Key, Arc<History>>,
    last_update: Option<NaiveDate>,
}

impl InMemoryStorage {
    /// Makes the next history saves fail.
    #[cfg(test)]
    pub fn fail_next_saves(&self, n_saves: usize) {
        self.n_failing_saves.store(n_saves, Ordering::Relaxed);
    }

    #[cfg(test)]
    fn is_failing(&self) -> bool {
        self.n_failing_saves
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    #[cfg(not(test))]
    const fn is_failing(&self) -> bool {
        false
    }

    #[cfg(test)]
    pub async fn history(&self, key: &Key) -> Option<Arc<History>> {
        self.state.lock().await.histories.get(key).cloned()
    }

    #[cfg(test)]
    pub async fn last_update(&self) -> Option<NaiveDate> {
        self.state.lock().await.last_update
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn load(&self) -> Result<Snapshot> {
        let state = self.state.lock().await;
        Ok(Snapshot {
            histories: state
                .histories
                .iter()
                .map(|(key, history)| (key.clone(), History::clone(history)))
                .collect(),
            last_update: state.last_update,
        })
    }

    async fn save_histories(&self, histories: &[(Key, Arc<History>)]) -> Result {
        if self.is_failing() {
            bail!("simulated failure");
        }

        let mut state = self.state.lock().await;
        for (key, history) in histories {
            state.histories.insert(key.clone(), Arc::clone(history));
        }
        Ok(())
    }

    async fn save_last_update(&self, date: NaiveDate) -> Result {
        self.state.lock().await.last_update = Some(date);
        Ok(())
    }
}
