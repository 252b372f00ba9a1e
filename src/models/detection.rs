use serde::{Deserialize, Serialize};

use crate::models::scan::PixelBox;

/// Class label the detection model assigns to QR code regions. Every other
/// label is reported as a plain object detection.
pub const QR_CLASS: &str = "qr_code";

/// Axis-aligned box in normalized image coordinates ([0,1] on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Convert to pixel coordinates, clamped to the image extents.
    pub fn to_pixels(&self, img_w: u32, img_h: u32) -> PixelBox {
        let w = img_w as f64;
        let h = img_h as f64;

        let x0 = (self.x * w).clamp(0.0, w).round() as u32;
        let y0 = (self.y * h).clamp(0.0, h).round() as u32;
        let x1 = (((self.x + self.width) * w).clamp(0.0, w).round() as u32).max(x0);
        let y1 = (((self.y + self.height) * h).clamp(0.0, h).round() as u32).max(y0);

        PixelBox {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }
}

/// One output of the external detection model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

impl Detection {
    pub fn is_qr(&self) -> bool {
        self.class == QR_CLASS
    }
}
