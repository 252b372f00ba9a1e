use crate::models::detection::BoundingBox;
use crate::models::scan::PixelBox;

/// The padded, clamped rectangle collapsed to zero area. The QR candidate is
/// skipped; the rest of the scan is unaffected.
#[derive(Debug, Clone, thiserror::Error)]
#[error("region for detection at ({x:.3}, {y:.3}) has zero area after clamping")]
pub struct DegenerateRegion {
    pub x: f64,
    pub y: f64,
}

/// Compute the pixel-space crop rectangle for a QR-class detection.
///
/// The normalized box is converted to pixels, expanded on every side by
/// `padding` times its own width/height, then clamped to the image extents.
pub fn padded_region(
    bbox: &BoundingBox,
    img_w: u32,
    img_h: u32,
    padding: f64,
) -> Result<PixelBox, DegenerateRegion> {
    let w = img_w as f64;
    let h = img_h as f64;

    let box_w = bbox.width * w;
    let box_h = bbox.height * h;
    let pad_x = box_w * padding;
    let pad_y = box_h * padding;

    let x0 = (bbox.x * w - pad_x).clamp(0.0, w);
    let y0 = (bbox.y * h - pad_y).clamp(0.0, h);
    let x1 = (bbox.x * w + box_w + pad_x).clamp(0.0, w);
    let y1 = (bbox.y * h + box_h + pad_y).clamp(0.0, h);

    let x = x0.floor() as u32;
    let y = y0.floor() as u32;
    let width = (x1.ceil() as u32).min(img_w).saturating_sub(x);
    let height = (y1.ceil() as u32).min(img_h).saturating_sub(y);

    if width == 0 || height == 0 {
        return Err(DegenerateRegion {
            x: bbox.x,
            y: bbox.y,
        });
    }

    Ok(PixelBox {
        x,
        y,
        width,
        height,
    })
}
