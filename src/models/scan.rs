use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::task::TaskStatus;

/// Axis-aligned box in pixel coordinates as reported in scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Top-left corner of a decoded QR code's detection box, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

/// A non-QR detection passed through to the result unchanged (apart from
/// coordinate conversion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedObject {
    pub class: String,
    pub confidence: f64,
    pub bounding_box: PixelBox,
}

/// A successfully decoded QR code. Confidence is the originating detection's
/// score; decoding itself is binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrCode {
    pub qr_id: String,
    pub data: String,
    pub confidence: f64,
    pub position: Position,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanMetadata {
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub image_resolution: String,
    /// QR-class detections that produced no payload (degenerate region or
    /// exhausted decode cascade).
    pub undecoded_qr_count: u32,
}

/// The assembled result of one scan task. Immutable once attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub status: TaskStatus,
    pub detected_objects: Vec<DetectedObject>,
    pub qr_codes: Vec<QrCode>,
    pub scan_metadata: ScanMetadata,
}
