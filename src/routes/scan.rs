use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{error, warn};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{TaskStatusResponse, UploadResponse};
use crate::models::task::TaskStatus;
use crate::services::queue::QueuedScan;
use crate::services::task_store::TaskStore;

/// POST /api/v1/images/upload — Submit a warehouse image for scanning.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, StatusCode> {
    // Extract the image file from the multipart upload
    let mut image_data: Option<(Vec<u8>, &'static str)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        if field.name() == Some("image") {
            let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;

            // Validate image format using the `image` crate
            let format =
                image::guess_format(&data).map_err(|_| StatusCode::UNSUPPORTED_MEDIA_TYPE)?;
            let extension = match format {
                image::ImageFormat::Jpeg => "jpg",
                image::ImageFormat::Png => "png",
                image::ImageFormat::WebP => "webp",
                _ => return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE),
            };

            image_data = Some((data.to_vec(), extension));
        }
    }

    let (data, extension) = image_data.ok_or(StatusCode::BAD_REQUEST)?;

    // Persist the upload, then create the task record and enqueue its claim
    let filename = format!("{}.{}", Uuid::new_v4(), extension);
    let path = state.uploads_dir.join(filename);
    tokio::fs::write(&path, &data).await.map_err(|e| {
        error!(error = %e, "failed to persist upload");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let image_ref = path.to_string_lossy().into_owned();
    let task = state.tasks.create(&image_ref).await.map_err(|e| {
        error!(error = %e, "failed to create scan task");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    state
        .queue
        .enqueue(&QueuedScan {
            task_id: task.id,
            image_ref,
        })
        .await
        .map_err(|e| {
            error!(task_id = %task.id, error = %e, "failed to enqueue scan task");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    metrics::counter!("scan_tasks_submitted").increment(1);
    if let Ok(depth) = state.queue.queue_depth().await {
        metrics::gauge!("scan_queue_depth").set(depth as f64);
    }

    Ok(Json(UploadResponse {
        task_id: task.id,
        status: task.status,
        message: "Image submitted for scanning".to_string(),
    }))
}

/// GET /api/v1/results/:task_id — Resolve a scan task.
///
/// Task status is checked before the result store: non-terminal tasks report
/// their status without touching the store, terminal SUCCESS tasks resolve
/// through the cache-first/durable-fallback read.
pub async fn get_task_result(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<(StatusCode, Json<TaskStatusResponse>), StatusCode> {
    let task = state.tasks.get(task_id).await.map_err(|e| {
        error!(task_id = %task_id, error = %e, "task lookup failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let Some(task) = task else {
        return Err(StatusCode::NOT_FOUND);
    };

    let response = match task.status {
        TaskStatus::Pending | TaskStatus::Processing => TaskStatusResponse {
            task_id,
            status: task.status,
            result: None,
            error: None,
        },
        TaskStatus::Failure => TaskStatusResponse {
            task_id,
            status: task.status,
            result: None,
            error: task.error,
        },
        TaskStatus::Success => {
            let result = state.store.get(task_id).await.map_err(|e| {
                error!(task_id = %task_id, error = %e, "result lookup failed");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

            if result.is_none() {
                // A SUCCESS task always has a durably stored result; its
                // absence means the store and task record disagree.
                warn!(task_id = %task_id, "terminal task has no stored result");
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }

            TaskStatusResponse {
                task_id,
                status: task.status,
                result,
                error: None,
            }
        }
    };

    Ok((StatusCode::OK, Json(response)))
}
