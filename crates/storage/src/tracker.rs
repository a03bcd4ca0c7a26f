use anyhow::{Context, Result};
use async_trait::async_trait;
use state::WORKING_ID_KEY;

use crate::Store;

/// Accessor for the persisted `working_id`. Holds no decision logic.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    /// `None` before the first successful run.
    async fn load(&self) -> Result<Option<u32>>;

    async fn store(&self, id: u32) -> Result<()>;

    /// Compare-and-swap: writes only if the record still equals `expected`.
    async fn store_if(&self, expected: Option<u32>, id: u32) -> Result<bool>;
}

#[derive(Clone)]
pub struct SqliteTracker {
    store: Store,
}

impl SqliteTracker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn clear(&self) -> Result<bool> {
        self.store.clear_value(WORKING_ID_KEY).await
    }
}

#[async_trait]
impl TrackerStore for SqliteTracker {
    async fn load(&self) -> Result<Option<u32>> {
        self.store
            .get_value(WORKING_ID_KEY)
            .await?
            .map(|raw| u32::try_from(raw).with_context(|| format!("stored working_id {raw} out of range")))
            .transpose()
    }

    async fn store(&self, id: u32) -> Result<()> {
        self.store.put_value(WORKING_ID_KEY, i64::from(id)).await
    }

    async fn store_if(&self, expected: Option<u32>, id: u32) -> Result<bool> {
        self.store
            .compare_and_put(WORKING_ID_KEY, expected.map(i64::from), i64::from(id))
            .await
    }
}
