//! Text and image renderings of a binary raster.

use std::path::Path;

use image::{GrayImage, Luma};

use crate::raster::BinaryRaster;

/// One line per row, `#` for lit cells and `.` for unlit ones.
pub fn render_ascii(raster: &BinaryRaster) -> String {
    let mut out = String::with_capacity((raster.width() as usize + 1) * raster.height() as usize);
    for row in 0..raster.height() {
        for col in 0..raster.width() {
            out.push(if raster.get(row, col) { '#' } else { '.' });
        }
        out.push('\n');
    }
    out
}

/// White lit pixels on black, at `scale` pixels per cell.
pub fn to_gray_image(raster: &BinaryRaster, scale: u32) -> GrayImage {
    let scale = scale.max(1);
    GrayImage::from_fn(raster.width() * scale, raster.height() * scale, |x, y| {
        if raster.get(y / scale, x / scale) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

pub fn save_image(raster: &BinaryRaster, scale: u32, path: &Path) -> image::ImageResult<()> {
    to_gray_image(raster, scale).save(path)
}
