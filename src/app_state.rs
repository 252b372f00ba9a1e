use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;

use crate::services::cache::RedisResultCache;
use crate::services::queue::TaskQueue;
use crate::services::store::{PgResultBackend, ResultStore};
use crate::services::task_store::PgTaskStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub tasks: Arc<PgTaskStore>,
    pub store: Arc<ResultStore<PgResultBackend, RedisResultCache>>,
    pub queue: Arc<TaskQueue>,
    pub uploads_dir: PathBuf,
}

impl AppState {
    pub fn new(
        db: PgPool,
        tasks: PgTaskStore,
        store: ResultStore<PgResultBackend, RedisResultCache>,
        queue: TaskQueue,
        uploads_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            tasks: Arc::new(tasks),
            store: Arc::new(store),
            queue: Arc::new(queue),
            uploads_dir,
        }
    }
}
