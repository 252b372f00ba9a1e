//! Orchestrator end-to-end behavior over in-memory backends and a stub
//! detection model.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{canvas_with_golden_qr, GOLDEN_QR_PAYLOAD};
use depot_vision::models::detection::{BoundingBox, Detection};
use depot_vision::models::scan::ScanResult;
use depot_vision::models::task::TaskStatus;
use depot_vision::services::cache::MemoryResultCache;
use depot_vision::services::detector::{Detector, DetectorError};
use depot_vision::services::orchestrator::{Orchestrator, OrchestratorError, TaskOutcome};
use depot_vision::services::store::{MemoryResultBackend, ResultBackend, ResultStore, StoreError};
use depot_vision::services::task_store::{MemoryTaskStore, TaskStore};
use depot_vision::vision::consumer::PipelineConfig;
use uuid::Uuid;

/// Detector stub: fixed detection list, call counting.
struct StubDetector {
    detections: Vec<Detection>,
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl StubDetector {
    fn new(detections: Vec<Detection>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                detections,
                calls: calls.clone(),
                fail: false,
            },
            calls,
        )
    }

    fn failing() -> Self {
        Self {
            detections: vec![],
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
        }
    }
}

#[async_trait]
impl Detector for StubDetector {
    async fn detect(&self, _image_bytes: &[u8]) -> Result<Vec<Detection>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DetectorError::Api {
                status: 503,
                message: "model unavailable".to_string(),
            });
        }
        Ok(self.detections.clone())
    }
}

/// Durable backend that refuses every write.
struct FailingResultBackend;

#[async_trait]
impl ResultBackend for FailingResultBackend {
    async fn put(&self, _task_id: Uuid, _result: &ScanResult) -> Result<(), StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolClosed))
    }

    async fn get(&self, _task_id: Uuid) -> Result<Option<ScanResult>, StoreError> {
        Ok(None)
    }
}

fn detection(class: &str, confidence: f64, bbox: BoundingBox) -> Detection {
    Detection {
        class: class.to_string(),
        confidence,
        bounding_box: bbox,
    }
}

fn normalized(x: u32, y: u32, w: u32, h: u32, img_w: u32, img_h: u32) -> BoundingBox {
    BoundingBox {
        x: x as f64 / img_w as f64,
        y: y as f64 / img_h as f64,
        width: w as f64 / img_w as f64,
        height: h as f64 / img_h as f64,
    }
}

fn memory_store() -> ResultStore<MemoryResultBackend, MemoryResultCache> {
    ResultStore::new(
        MemoryResultBackend::new(),
        MemoryResultCache::new(Some(Duration::from_secs(60))),
    )
}

/// Write a canvas with the golden QR into `dir`; returns the image path and
/// a detection box covering the QR patch.
fn scan_image(dir: &tempfile::TempDir) -> (String, BoundingBox) {
    let (image, side) = canvas_with_golden_qr(640, 480, 100, 100, 8);
    let path = dir.path().join("scan.png");
    image.save(&path).expect("failed to write fixture image");
    (
        path.to_string_lossy().into_owned(),
        normalized(100, 100, side, side, 640, 480),
    )
}

#[tokio::test]
async fn scan_with_object_and_decodable_qr_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let (image_ref, qr_bbox) = scan_image(&dir);

    let (detector, _) = StubDetector::new(vec![
        detection("pallet", 0.92, normalized(400, 50, 180, 200, 640, 480)),
        detection("qr_code", 0.98, qr_bbox),
    ]);

    let orchestrator = Orchestrator::new(
        MemoryTaskStore::new(),
        memory_store(),
        detector,
        PipelineConfig::default(),
    );

    let task = orchestrator.tasks().create(&image_ref).await.unwrap();
    let outcome = orchestrator.process(task.id, &image_ref).await.unwrap();

    let TaskOutcome::Completed(result) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };

    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.detected_objects.len(), 1);
    assert_eq!(result.detected_objects[0].class, "pallet");
    assert_eq!(result.detected_objects[0].confidence, 0.92);

    assert_eq!(result.qr_codes.len(), 1);
    let qr = &result.qr_codes[0];
    assert_eq!(qr.qr_id, "qr_1");
    assert_eq!(qr.data, GOLDEN_QR_PAYLOAD);
    // Confidence is inherited from the QR detection, not blended.
    assert_eq!(qr.confidence, 0.98);
    assert_eq!((qr.position.x, qr.position.y), (100, 100));

    assert_eq!(result.scan_metadata.undecoded_qr_count, 0);
    assert_eq!(result.scan_metadata.image_resolution, "640x480");

    let task = orchestrator.tasks().get(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Success);

    // The result is durably resolvable after completion.
    let stored = orchestrator.store().get(task.id).await.unwrap().unwrap();
    assert_eq!(stored.qr_codes[0].data, GOLDEN_QR_PAYLOAD);
}

#[tokio::test]
async fn qr_region_failing_every_strategy_is_success_with_a_count() {
    let dir = tempfile::tempdir().unwrap();
    let (image_ref, _) = scan_image(&dir);

    // Candidate box over a blank part of the canvas: nothing to decode.
    let (detector, _) = StubDetector::new(vec![detection(
        "qr_code",
        0.9,
        normalized(420, 300, 120, 120, 640, 480),
    )]);

    let orchestrator = Orchestrator::new(
        MemoryTaskStore::new(),
        memory_store(),
        detector,
        PipelineConfig::default(),
    );

    let task = orchestrator.tasks().create(&image_ref).await.unwrap();
    let outcome = orchestrator.process(task.id, &image_ref).await.unwrap();

    let TaskOutcome::Completed(result) = outcome else {
        panic!("expected completion, got {outcome:?}");
    };

    assert_eq!(result.status, TaskStatus::Success);
    assert!(result.qr_codes.is_empty());
    assert_eq!(result.scan_metadata.undecoded_qr_count, 1);
}

#[tokio::test]
async fn reprocessing_a_terminal_task_is_an_idempotent_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let (image_ref, qr_bbox) = scan_image(&dir);

    let (detector, calls) = StubDetector::new(vec![detection("qr_code", 0.98, qr_bbox)]);

    let orchestrator = Orchestrator::new(
        MemoryTaskStore::new(),
        memory_store(),
        detector,
        PipelineConfig::default(),
    );

    let task = orchestrator.tasks().create(&image_ref).await.unwrap();

    let first = orchestrator.process(task.id, &image_ref).await.unwrap();
    let TaskOutcome::Completed(first_result) = first else {
        panic!("expected completion, got {first:?}");
    };

    let second = orchestrator.process(task.id, &image_ref).await.unwrap();
    let TaskOutcome::AlreadyTerminal { status, result } = second else {
        panic!("expected terminal no-op, got {second:?}");
    };

    assert_eq!(status, TaskStatus::Success);
    let second_result = result.expect("terminal task must resolve its result");
    assert_eq!(second_result.qr_codes[0].data, first_result.qr_codes[0].data);

    // The decode pipeline did not run again.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unreadable_source_image_fails_the_task() {
    let (detector, calls) = StubDetector::new(vec![]);

    let orchestrator = Orchestrator::new(
        MemoryTaskStore::new(),
        memory_store(),
        detector,
        PipelineConfig::default(),
    );

    let task = orchestrator.tasks().create("/nonexistent/scan.png").await.unwrap();
    let outcome = orchestrator
        .process(task.id, "/nonexistent/scan.png")
        .await
        .unwrap();

    assert!(matches!(outcome, TaskOutcome::Failed(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let task = orchestrator.tasks().get(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failure);
    assert!(task.error.unwrap().contains("unreadable source image"));

    // No partial result was stored.
    assert!(orchestrator.store().get(task.id).await.unwrap().is_none());
}

#[tokio::test]
async fn detector_invocation_failure_fails_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let (image_ref, _) = scan_image(&dir);

    let orchestrator = Orchestrator::new(
        MemoryTaskStore::new(),
        memory_store(),
        StubDetector::failing(),
        PipelineConfig::default(),
    );

    let task = orchestrator.tasks().create(&image_ref).await.unwrap();
    let outcome = orchestrator.process(task.id, &image_ref).await.unwrap();

    let TaskOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("detection model invocation failed"));

    let task = orchestrator.tasks().get(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failure);
}

#[tokio::test]
async fn durable_store_write_failure_fails_the_task() {
    let dir = tempfile::tempdir().unwrap();
    let (image_ref, qr_bbox) = scan_image(&dir);

    let (detector, _) = StubDetector::new(vec![detection("qr_code", 0.98, qr_bbox)]);

    let store = ResultStore::new(FailingResultBackend, MemoryResultCache::new(None));
    let orchestrator = Orchestrator::new(
        MemoryTaskStore::new(),
        store,
        detector,
        PipelineConfig::default(),
    );

    let task = orchestrator.tasks().create(&image_ref).await.unwrap();
    let outcome = orchestrator.process(task.id, &image_ref).await.unwrap();

    let TaskOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("failed to persist result"));

    let task = orchestrator.tasks().get(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failure);
}

#[tokio::test]
async fn processing_an_unknown_task_is_an_error() {
    let (detector, _) = StubDetector::new(vec![]);
    let orchestrator = Orchestrator::new(
        MemoryTaskStore::new(),
        memory_store(),
        detector,
        PipelineConfig::default(),
    );

    let err = orchestrator
        .process(Uuid::new_v4(), "anywhere.png")
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::UnknownTask(_)));
}
