use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::scan::{ScanMetadata, ScanResult};
use crate::models::task::TaskStatus;
use crate::services::cache::ResultCache;
use crate::services::detector::{Detector, DetectorError};
use crate::services::store::{ResultBackend, ResultStore, StoreError};
use crate::services::task_store::{ClaimOutcome, TaskStore, TaskStoreError};
use crate::vision::consumer::{self, PipelineConfig, PipelineError};

/// Owns the lifecycle of one scan task: the exclusive claim, the
/// detection+decode pipeline, result attachment, and the terminal
/// transition. Constructed once per process with injected dependencies.
pub struct Orchestrator<T, B, C, D> {
    tasks: T,
    store: ResultStore<B, C>,
    detector: D,
    pipeline: PipelineConfig,
}

/// What processing one claim amounted to.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Pipeline ran to completion; the task is SUCCESS.
    Completed(ScanResult),
    /// An unrecoverable error was captured; the task is FAILURE.
    Failed(String),
    /// The task was already terminal; the stored result (if any) is returned
    /// without re-running the pipeline.
    AlreadyTerminal {
        status: TaskStatus,
        result: Option<ScanResult>,
    },
    /// Another worker holds the claim; nothing was done.
    InFlight,
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    TaskStore(#[from] TaskStoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown task {0}")]
    UnknownTask(Uuid),
}

/// Errors that end a task in FAILURE. Captured at the task boundary and
/// recorded as the error message; they never escape as panics.
#[derive(Debug, thiserror::Error)]
enum ScanError {
    #[error("unreadable source image {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("corrupt source image: {0}")]
    Image(#[from] image::ImageError),

    #[error("detection model invocation failed: {0}")]
    Detector(#[from] DetectorError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl<T, B, C, D> Orchestrator<T, B, C, D>
where
    T: TaskStore,
    B: ResultBackend,
    C: ResultCache,
    D: Detector,
{
    pub fn new(tasks: T, store: ResultStore<B, C>, detector: D, pipeline: PipelineConfig) -> Self {
        Self {
            tasks,
            store,
            detector,
            pipeline,
        }
    }

    pub fn tasks(&self) -> &T {
        &self.tasks
    }

    pub fn store(&self) -> &ResultStore<B, C> {
        &self.store
    }

    /// Process one task claim end to end. Terminal tasks resolve
    /// idempotently to their stored result; pipeline failures transition the
    /// task to FAILURE. Only task-store/result-store infrastructure errors
    /// propagate to the caller.
    pub async fn process(
        &self,
        task_id: Uuid,
        image_ref: &str,
    ) -> Result<TaskOutcome, OrchestratorError> {
        match self.tasks.claim(task_id).await? {
            ClaimOutcome::NotFound => Err(OrchestratorError::UnknownTask(task_id)),
            ClaimOutcome::InFlight => {
                warn!(task_id = %task_id, "task already claimed by another worker");
                Ok(TaskOutcome::InFlight)
            }
            ClaimOutcome::AlreadyTerminal(task) => {
                info!(task_id = %task_id, status = ?task.status, "task already terminal");
                let result = self.store.get(task_id).await?;
                Ok(TaskOutcome::AlreadyTerminal {
                    status: task.status,
                    result,
                })
            }
            ClaimOutcome::Claimed(_) => self.run_claimed(task_id, image_ref).await,
        }
    }

    async fn run_claimed(
        &self,
        task_id: Uuid,
        image_ref: &str,
    ) -> Result<TaskOutcome, OrchestratorError> {
        let started = Instant::now();

        let result = match self.scan(image_ref, started).await {
            Ok(result) => result,
            Err(e) => {
                let message = e.to_string();
                error!(task_id = %task_id, error = %message, "scan pipeline failed");
                self.tasks.fail(task_id, &message).await?;
                metrics::counter!("scan_tasks_failed").increment(1);
                return Ok(TaskOutcome::Failed(message));
            }
        };

        // The result is the task's contract with its caller: losing the
        // durable write fails the task, cache health never does.
        if let Err(e) = self.store.put(task_id, &result).await {
            let message = format!("failed to persist result: {e}");
            error!(task_id = %task_id, error = %e, "durable result write failed");
            self.tasks.fail(task_id, &message).await?;
            metrics::counter!("scan_tasks_failed").increment(1);
            return Ok(TaskOutcome::Failed(message));
        }

        self.tasks.complete(task_id).await?;

        metrics::counter!("scan_tasks_completed").increment(1);
        metrics::histogram!("scan_processing_seconds").record(started.elapsed().as_secs_f64());

        info!(
            task_id = %task_id,
            objects = result.detected_objects.len(),
            qr_codes = result.qr_codes.len(),
            undecoded = result.scan_metadata.undecoded_qr_count,
            processing_time_ms = result.scan_metadata.processing_time_ms,
            "scan completed"
        );

        Ok(TaskOutcome::Completed(result))
    }

    async fn scan(&self, image_ref: &str, started: Instant) -> Result<ScanResult, ScanError> {
        let bytes = tokio::fs::read(image_ref)
            .await
            .map_err(|source| ScanError::Read {
                path: image_ref.to_string(),
                source,
            })?;

        let image = image::load_from_memory(&bytes)?;
        let (width, height) = (image.width(), image.height());

        let detections = self.detector.detect(&bytes).await?;
        info!(detections = detections.len(), "detection model returned");

        let consumed = consumer::consume(&image, detections, &self.pipeline).await?;

        Ok(ScanResult {
            status: TaskStatus::Success,
            detected_objects: consumed.detected_objects,
            qr_codes: consumed.qr_codes,
            scan_metadata: ScanMetadata {
                processing_time_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
                image_resolution: format!("{width}x{height}"),
                undecoded_qr_count: consumed.undecoded_qr_count,
            },
        })
    }
}
