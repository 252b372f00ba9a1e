use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::task::{ScanTask, TaskStatus};

fn task_from_row(row: &sqlx::postgres::PgRow) -> Result<ScanTask, sqlx::Error> {
    let status_str: String = row.try_get("status")?;
    let status = TaskStatus::from_db_str(&status_str)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown task status {status_str:?}").into()))?;

    Ok(ScanTask {
        id: row.try_get("id")?,
        status,
        image_ref: row.try_get("image_ref")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        error: row.try_get("error")?,
    })
}

/// Insert a new scan task in PENDING
pub async fn create_task(pool: &PgPool, image_ref: &str) -> Result<ScanTask, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO scan_tasks (status, image_ref)
        VALUES ('pending', $1)
        RETURNING id, status, image_ref, created_at, completed_at, error
        "#,
    )
    .bind(image_ref)
    .fetch_one(pool)
    .await?;

    task_from_row(&row)
}

/// Get a task by ID
pub async fn get_task(pool: &PgPool, task_id: Uuid) -> Result<Option<ScanTask>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, status, image_ref, created_at, completed_at, error
        FROM scan_tasks
        WHERE id = $1
        "#,
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(task_from_row).transpose()
}

/// Atomically claim a PENDING task for processing. Returns the claimed task,
/// or None when the compare-and-set missed (task absent, already claimed, or
/// already terminal).
pub async fn claim_task(pool: &PgPool, task_id: Uuid) -> Result<Option<ScanTask>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE scan_tasks
        SET status = 'processing',
            processing_started_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING id, status, image_ref, created_at, completed_at, error
        "#,
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(task_from_row).transpose()
}

/// Move a PROCESSING task to a terminal status. Returns false when the task
/// was not in PROCESSING (terminal states are immutable).
pub async fn finish_task(
    pool: &PgPool,
    task_id: Uuid,
    status: TaskStatus,
    error: Option<&str>,
) -> Result<bool, sqlx::Error> {
    debug_assert!(status.is_terminal());

    let result = sqlx::query(
        r#"
        UPDATE scan_tasks
        SET status = $1,
            error = $2,
            completed_at = NOW()
        WHERE id = $3 AND status = 'processing'
        "#,
    )
    .bind(status.as_db_str())
    .bind(error)
    .bind(task_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Insert a task's result. Write-once: a conflicting insert leaves the
/// original row untouched.
pub async fn insert_result(
    pool: &PgPool,
    task_id: Uuid,
    result: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO scan_results (task_id, result)
        VALUES ($1, $2)
        ON CONFLICT (task_id) DO NOTHING
        "#,
    )
    .bind(task_id)
    .bind(result)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a task's stored result
pub async fn get_result(
    pool: &PgPool,
    task_id: Uuid,
) -> Result<Option<serde_json::Value>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT result
        FROM scan_results
        WHERE task_id = $1
        "#,
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| r.try_get("result")).transpose()
}
