use serde::Serialize;
use uuid::Uuid;

use crate::models::scan::ScanResult;
use crate::models::task::TaskStatus;

/// Response after submitting an image for scanning.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub message: String,
}

/// Response for querying a scan task.
#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
