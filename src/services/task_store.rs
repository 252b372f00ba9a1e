use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::models::task::{ScanTask, TaskStatus};

/// Outcome of a claim attempt (the PENDING -> PROCESSING compare-and-set).
#[derive(Debug)]
pub enum ClaimOutcome {
    /// This caller now exclusively owns the task's processing.
    Claimed(ScanTask),
    /// The task already reached a terminal state; resubmission is a no-op.
    AlreadyTerminal(ScanTask),
    /// Another worker holds the task in PROCESSING.
    InFlight,
    NotFound,
}

/// Task lifecycle persistence. Transitions are monotonic; the claim is an
/// atomic compare-and-set so at most one worker processes a task.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, image_ref: &str) -> Result<ScanTask, TaskStoreError>;
    async fn get(&self, id: Uuid) -> Result<Option<ScanTask>, TaskStoreError>;
    async fn claim(&self, id: Uuid) -> Result<ClaimOutcome, TaskStoreError>;
    /// PROCESSING -> SUCCESS. Fails on any other current status.
    async fn complete(&self, id: Uuid) -> Result<(), TaskStoreError>;
    /// PROCESSING -> FAILURE with an error message.
    async fn fail(&self, id: Uuid, error: &str) -> Result<(), TaskStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TaskStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("task {id} cannot transition to {to:?} from its current status")]
    InvalidTransition { id: Uuid, to: TaskStatus },

    #[error("task {0} not found")]
    NotFound(Uuid),
}

/// Postgres-backed task store.
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, image_ref: &str) -> Result<ScanTask, TaskStoreError> {
        Ok(queries::create_task(&self.pool, image_ref).await?)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScanTask>, TaskStoreError> {
        Ok(queries::get_task(&self.pool, id).await?)
    }

    async fn claim(&self, id: Uuid) -> Result<ClaimOutcome, TaskStoreError> {
        if let Some(task) = queries::claim_task(&self.pool, id).await? {
            return Ok(ClaimOutcome::Claimed(task));
        }

        // CAS missed: inspect the current status to tell the cases apart.
        match queries::get_task(&self.pool, id).await? {
            Some(task) if task.status.is_terminal() => Ok(ClaimOutcome::AlreadyTerminal(task)),
            Some(_) => Ok(ClaimOutcome::InFlight),
            None => Ok(ClaimOutcome::NotFound),
        }
    }

    async fn complete(&self, id: Uuid) -> Result<(), TaskStoreError> {
        let updated = queries::finish_task(&self.pool, id, TaskStatus::Success, None).await?;
        if !updated {
            return Err(TaskStoreError::InvalidTransition {
                id,
                to: TaskStatus::Success,
            });
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<(), TaskStoreError> {
        let updated = queries::finish_task(&self.pool, id, TaskStatus::Failure, Some(error)).await?;
        if !updated {
            return Err(TaskStoreError::InvalidTransition {
                id,
                to: TaskStatus::Failure,
            });
        }
        Ok(())
    }
}

/// In-memory task store with identical transition semantics, for tests and
/// infrastructure-free runs.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<Uuid, ScanTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish(&self, id: Uuid, to: TaskStatus, error: Option<&str>) -> Result<(), TaskStoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&id)
            .ok_or(TaskStoreError::NotFound(id))?;
        if task.status != TaskStatus::Processing {
            return Err(TaskStoreError::InvalidTransition { id, to });
        }
        task.status = to;
        task.completed_at = Some(Utc::now());
        task.error = error.map(str::to_string);
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, image_ref: &str) -> Result<ScanTask, TaskStoreError> {
        let task = ScanTask {
            id: Uuid::new_v4(),
            status: TaskStatus::Pending,
            image_ref: image_ref.to_string(),
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        };
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(task)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScanTask>, TaskStoreError> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn claim(&self, id: Uuid) -> Result<ClaimOutcome, TaskStoreError> {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(task) = tasks.get_mut(&id) else {
            return Ok(ClaimOutcome::NotFound);
        };
        match task.status {
            TaskStatus::Pending => {
                task.status = TaskStatus::Processing;
                Ok(ClaimOutcome::Claimed(task.clone()))
            }
            TaskStatus::Processing => Ok(ClaimOutcome::InFlight),
            TaskStatus::Success | TaskStatus::Failure => {
                Ok(ClaimOutcome::AlreadyTerminal(task.clone()))
            }
        }
    }

    async fn complete(&self, id: Uuid) -> Result<(), TaskStoreError> {
        self.finish(id, TaskStatus::Success, None)
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<(), TaskStoreError> {
        self.finish(id, TaskStatus::Failure, Some(error))
    }
}
