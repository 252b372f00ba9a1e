use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::contrast::{adaptive_threshold, otsu_level, threshold, ThresholdType};
use imageproc::filter::{gaussian_blur_f32, median_filter, sharpen3x3};

/// A version-1 QR code is 21 modules; smaller buffers cannot hold one.
const MIN_QR_SIDE: u32 = 21;

/// Sigma for the smoothing pass shared by the blur-based strategies.
const BLUR_SIGMA: f32 = 1.0;

/// Block radius for adaptive thresholding (an 11x11 neighbourhood).
const ADAPTIVE_BLOCK_RADIUS: u32 = 5;

/// Upscale factors for the resize strategy, tried in order.
const UPSCALE_FACTORS: [f32; 2] = [1.5, 2.0];

/// One transform+decode attempt in the fixed cascade. The declaration order
/// here is not the dispatch order; `CASCADE` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Decode the unmodified crop.
    Direct,
    /// Gaussian blur, then adaptive local threshold.
    BlurAdaptive,
    /// Median-filter denoise, then Otsu global threshold.
    MedianOtsu,
    /// 3x3 sharpen, then Otsu global threshold.
    SharpenOtsu,
    /// Upscale 1.5x then 2.0x, Otsu threshold each; first that decodes wins.
    UpscaleOtsu,
    /// Gaussian blur then Otsu threshold, normal polarity first, inverted second.
    BlurOtsuPolarity,
    /// Rotate the original crop 90, 180, 270 degrees, decoding each directly.
    Rotate,
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Direct => "direct",
            StrategyKind::BlurAdaptive => "blur_adaptive",
            StrategyKind::MedianOtsu => "median_otsu",
            StrategyKind::SharpenOtsu => "sharpen_otsu",
            StrategyKind::UpscaleOtsu => "upscale_otsu",
            StrategyKind::BlurOtsuPolarity => "blur_otsu_polarity",
            StrategyKind::Rotate => "rotate",
        }
    }
}

/// The decode cascade, cheapest first. Order is a reproducibility contract:
/// the engine walks this list front to back and stops at the first success.
pub const CASCADE: [StrategyKind; 7] = [
    StrategyKind::Direct,
    StrategyKind::BlurAdaptive,
    StrategyKind::MedianOtsu,
    StrategyKind::SharpenOtsu,
    StrategyKind::UpscaleOtsu,
    StrategyKind::BlurOtsuPolarity,
    StrategyKind::Rotate,
];

/// Run one strategy against a crop. Pure: pixel buffer in, payload or
/// nothing out.
pub fn run(kind: StrategyKind, crop: &GrayImage) -> Option<String> {
    match kind {
        StrategyKind::Direct => decode(crop),
        StrategyKind::BlurAdaptive => {
            let blurred = gaussian_blur_f32(crop, BLUR_SIGMA);
            decode(&adaptive_threshold(&blurred, ADAPTIVE_BLOCK_RADIUS))
        }
        StrategyKind::MedianOtsu => {
            let denoised = median_filter(crop, 1, 1);
            decode(&otsu(&denoised, ThresholdType::Binary))
        }
        StrategyKind::SharpenOtsu => {
            let sharpened = sharpen3x3(crop);
            decode(&otsu(&sharpened, ThresholdType::Binary))
        }
        StrategyKind::UpscaleOtsu => UPSCALE_FACTORS.iter().find_map(|&factor| {
            let new_w = (crop.width() as f32 * factor) as u32;
            let new_h = (crop.height() as f32 * factor) as u32;
            let scaled = imageops::resize(crop, new_w, new_h, FilterType::CatmullRom);
            decode(&otsu(&scaled, ThresholdType::Binary))
        }),
        StrategyKind::BlurOtsuPolarity => {
            let blurred = gaussian_blur_f32(crop, BLUR_SIGMA);
            [ThresholdType::Binary, ThresholdType::BinaryInverted]
                .into_iter()
                .find_map(|polarity| decode(&otsu(&blurred, polarity)))
        }
        StrategyKind::Rotate => decode(&imageops::rotate90(crop))
            .or_else(|| decode(&imageops::rotate180(crop)))
            .or_else(|| decode(&imageops::rotate270(crop))),
    }
}

fn otsu(img: &GrayImage, polarity: ThresholdType) -> GrayImage {
    threshold(img, otsu_level(img), polarity)
}

/// Decode the first QR grid rqrr finds in the buffer.
pub(crate) fn decode(img: &GrayImage) -> Option<String> {
    if img.width() < MIN_QR_SIDE || img.height() < MIN_QR_SIDE {
        return None;
    }

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        img.width() as usize,
        img.height() as usize,
        |x, y| img.get_pixel(x as u32, y as u32)[0],
    );

    prepared
        .detect_grids()
        .into_iter()
        .find_map(|grid| grid.decode().ok().map(|(_, content)| content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_order_is_fixed() {
        assert_eq!(
            CASCADE,
            [
                StrategyKind::Direct,
                StrategyKind::BlurAdaptive,
                StrategyKind::MedianOtsu,
                StrategyKind::SharpenOtsu,
                StrategyKind::UpscaleOtsu,
                StrategyKind::BlurOtsuPolarity,
                StrategyKind::Rotate,
            ]
        );
    }

    #[test]
    fn buffers_too_small_for_a_qr_are_rejected() {
        let img = GrayImage::from_pixel(20, 20, image::Luma([255]));
        assert_eq!(decode(&img), None);
    }

    #[test]
    fn flat_buffer_decodes_nothing_under_any_strategy() {
        let img = GrayImage::from_pixel(64, 64, image::Luma([128]));
        for kind in CASCADE {
            assert_eq!(run(kind, &img), None, "strategy {}", kind.name());
        }
    }
}
