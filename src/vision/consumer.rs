use std::sync::Arc;

use futures::stream::{self, StreamExt};
use image::{imageops, DynamicImage, GrayImage};
use tracing::{debug, warn};

use crate::models::detection::Detection;
use crate::models::scan::{DetectedObject, Position, QrCode};
use crate::vision::{engine, region};

/// Knobs for one image's detection consumption.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Padding fraction applied to each side of a QR detection box.
    pub qr_padding: f64,
    /// Upper bound on concurrently decoding regions within one task.
    pub region_concurrency: usize,
    /// Detections below this confidence are dropped before partitioning.
    pub confidence_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            qr_padding: 0.15,
            region_concurrency: 4,
            confidence_threshold: 0.5,
        }
    }
}

/// Per-class results for one image: object detections passed through, QR
/// candidates routed through region extraction and the decode cascade.
#[derive(Debug, Clone)]
pub struct ConsumedDetections {
    pub detected_objects: Vec<DetectedObject>,
    pub qr_codes: Vec<QrCode>,
    pub undecoded_qr_count: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("region decode worker panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Map a full image's detection list into per-class results.
///
/// Regions decode concurrently up to `region_concurrency`; the strategy
/// cascade within each region stays strictly sequential. Output order
/// follows detection order regardless of which region finishes first.
pub async fn consume(
    image: &DynamicImage,
    detections: Vec<Detection>,
    config: &PipelineConfig,
) -> Result<ConsumedDetections, PipelineError> {
    let (img_w, img_h) = (image.width(), image.height());

    let mut detected_objects = Vec::new();
    let mut qr_candidates = Vec::new();

    for det in detections {
        if det.confidence < config.confidence_threshold {
            debug!(
                class = %det.class,
                confidence = det.confidence,
                "dropping low-confidence detection"
            );
            continue;
        }
        if det.is_qr() {
            qr_candidates.push(det);
        } else {
            detected_objects.push(DetectedObject {
                bounding_box: det.bounding_box.to_pixels(img_w, img_h),
                class: det.class,
                confidence: det.confidence,
            });
        }
    }

    let gray: Arc<GrayImage> = Arc::new(image.to_luma8());
    let padding = config.qr_padding;

    let decoded: Vec<Option<QrCode>> = stream::iter(qr_candidates.into_iter().enumerate().map(
        |(idx, det)| {
            let gray = Arc::clone(&gray);
            async move {
                let rect = match region::padded_region(&det.bounding_box, img_w, img_h, padding) {
                    Ok(rect) => rect,
                    Err(e) => {
                        warn!(candidate = idx + 1, error = %e, "skipping degenerate QR region");
                        return Ok::<Option<QrCode>, PipelineError>(None);
                    }
                };

                let outcome = tokio::task::spawn_blocking(move || {
                    let crop =
                        imageops::crop_imm(gray.as_ref(), rect.x, rect.y, rect.width, rect.height)
                            .to_image();
                    engine::decode_region(&crop)
                })
                .await?;

                let Some(payload) = outcome.payload() else {
                    debug!(
                        candidate = idx + 1,
                        attempts = outcome.attempts.len(),
                        "QR region exhausted the decode cascade"
                    );
                    return Ok(None);
                };

                let unpadded = det.bounding_box.to_pixels(img_w, img_h);
                Ok(Some(QrCode {
                    qr_id: format!("qr_{}", idx + 1),
                    data: payload.to_string(),
                    confidence: det.confidence,
                    position: Position {
                        x: unpadded.x,
                        y: unpadded.y,
                    },
                }))
            }
        },
    ))
    .buffered(config.region_concurrency.max(1))
    .collect::<Vec<_>>()
    .await
    .into_iter()
    .collect::<Result<_, _>>()?;

    let total_candidates = decoded.len() as u32;
    let qr_codes: Vec<QrCode> = decoded.into_iter().flatten().collect();
    let undecoded_qr_count = total_candidates - qr_codes.len() as u32;

    Ok(ConsumedDetections {
        detected_objects,
        qr_codes,
        undecoded_qr_count,
    })
}
