//! Shared fixtures: a known-good version 1-M QR matrix rendered into pixel
//! buffers for decode tests.

use image::{DynamicImage, GrayImage, Luma};

/// Payload encoded by `GOLDEN_QR`.
pub const GOLDEN_QR_PAYLOAD: &str = "4376471154038";

/// 21x21 version 1-M QR matrix ('#' = dark module).
pub const GOLDEN_QR: [&str; 21] = [
    "#######.....#.#######",
    "#.....#..#....#.....#",
    "#.###.#...##..#.###.#",
    "#.###.#...#...#.###.#",
    "#.###.#..####.#.###.#",
    "#.....#.#.#...#.....#",
    "#######.#.#.#.#######",
    ".........#...........",
    "#..#.##.######.#.....",
    "###.#..##..#.#.#.##..",
    "#..#.####.##..###...#",
    "..#.#..#....#####....",
    "..#...##.#.#.###.##..",
    "........#.#..####.##.",
    "#######...###.#.####.",
    "#.....#.#.....##....#",
    "#.###.#..##.###..#.##",
    "#.###.#.#.#..####..##",
    "#.###.#..###.###.#..#",
    "#.....#..####..##..#.",
    "#######.###..#.###...",
];

/// Render the golden matrix at `module_px` pixels per module with a quiet
/// zone of `quiet_modules` on every side.
pub fn render_golden_qr(module_px: u32, quiet_modules: u32) -> GrayImage {
    let side = (21 + 2 * quiet_modules) * module_px;
    let mut img = GrayImage::from_pixel(side, side, Luma([255u8]));

    for (row, line) in GOLDEN_QR.iter().enumerate() {
        for (col, ch) in line.chars().enumerate() {
            if ch != '#' {
                continue;
            }
            let x0 = (quiet_modules + col as u32) * module_px;
            let y0 = (quiet_modules + row as u32) * module_px;
            for dy in 0..module_px {
                for dx in 0..module_px {
                    img.put_pixel(x0 + dx, y0 + dy, Luma([0u8]));
                }
            }
        }
    }

    img
}

/// A white canvas with the golden QR pasted at `(x, y)`. Returns the image
/// and the pasted patch's side length.
pub fn canvas_with_golden_qr(
    canvas_w: u32,
    canvas_h: u32,
    x: u32,
    y: u32,
    module_px: u32,
) -> (DynamicImage, u32) {
    let qr = render_golden_qr(module_px, 4);
    let side = qr.width();
    let mut canvas = GrayImage::from_pixel(canvas_w, canvas_h, Luma([255u8]));
    image::imageops::overlay(&mut canvas, &qr, x as i64, y as i64);
    (DynamicImage::ImageLuma8(canvas), side)
}
