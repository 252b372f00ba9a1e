use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::db::queries;
use crate::models::scan::ScanResult;
use crate::services::cache::ResultCache;

/// Durable result storage: write-once per task identifier, read-many.
#[async_trait]
pub trait ResultBackend: Send + Sync {
    async fn put(&self, task_id: Uuid, result: &ScanResult) -> Result<(), StoreError>;
    async fn get(&self, task_id: Uuid) -> Result<Option<ScanResult>, StoreError>;
}

/// Two-tier result repository: durable store as source of truth, cache as a
/// read accelerator.
///
/// `put` writes durably first; the cache write is best-effort. `get` reads
/// the cache first and falls back to the durable store, repopulating the
/// cache on a fallback hit. The cache is never the sole holder of a result.
pub struct ResultStore<B, C> {
    durable: B,
    cache: C,
}

impl<B: ResultBackend, C: ResultCache> ResultStore<B, C> {
    pub fn new(durable: B, cache: C) -> Self {
        Self { durable, cache }
    }

    pub async fn put(&self, task_id: Uuid, result: &ScanResult) -> Result<(), StoreError> {
        self.durable.put(task_id, result).await?;

        match serde_json::to_string(result) {
            Ok(payload) => {
                if let Err(e) = self.cache.put(task_id, &payload).await {
                    warn!(task_id = %task_id, error = %e, "result cache write failed");
                }
            }
            Err(e) => warn!(task_id = %task_id, error = %e, "result cache serialization failed"),
        }

        Ok(())
    }

    /// Resolve a result. `None` means the identifier has no stored result;
    /// callers distinguish "still processing" via the task's status before
    /// consulting the store.
    pub async fn get(&self, task_id: Uuid) -> Result<Option<ScanResult>, StoreError> {
        match self.cache.get(task_id).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(result) => return Ok(Some(result)),
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "discarding undecodable cache entry")
                }
            },
            Ok(None) => {}
            Err(e) => warn!(task_id = %task_id, error = %e, "result cache read failed"),
        }

        let Some(result) = self.durable.get(task_id).await? else {
            return Ok(None);
        };

        if let Ok(payload) = serde_json::to_string(&result) {
            if let Err(e) = self.cache.put(task_id, &payload).await {
                warn!(task_id = %task_id, error = %e, "result cache repopulation failed");
            }
        }

        Ok(Some(result))
    }
}

/// Postgres-backed durable result storage.
pub struct PgResultBackend {
    pool: PgPool,
}

impl PgResultBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultBackend for PgResultBackend {
    async fn put(&self, task_id: Uuid, result: &ScanResult) -> Result<(), StoreError> {
        let value = serde_json::to_value(result).map_err(StoreError::Serialize)?;
        queries::insert_result(&self.pool, task_id, &value)
            .await
            .map_err(StoreError::Database)
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<ScanResult>, StoreError> {
        let Some(value) = queries::get_result(&self.pool, task_id)
            .await
            .map_err(StoreError::Database)?
        else {
            return Ok(None);
        };
        let result = serde_json::from_value(value).map_err(StoreError::Serialize)?;
        Ok(Some(result))
    }
}

/// In-memory durable backend with the same write-once semantics, for tests
/// and infrastructure-free runs.
#[derive(Default)]
pub struct MemoryResultBackend {
    results: Mutex<HashMap<Uuid, ScanResult>>,
}

impl MemoryResultBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultBackend for MemoryResultBackend {
    async fn put(&self, task_id: Uuid, result: &ScanResult) -> Result<(), StoreError> {
        // Write-once: a second write for the same identifier is a no-op.
        if let Entry::Vacant(entry) = self.results.lock().unwrap().entry(task_id) {
            entry.insert(result.clone());
        }
        Ok(())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<ScanResult>, StoreError> {
        Ok(self.results.lock().unwrap().get(&task_id).cloned())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("durable store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("result serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
