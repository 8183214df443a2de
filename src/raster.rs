//! Reduction of decoded frames to binary rasters.

use image::{imageops, DynamicImage, Rgb, RgbImage};

use crate::config::{ConversionConfig, CropRect, ResizeFilter};
use crate::video::RawFrame;

/// Grid of lit/unlit cells, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRaster {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl BinaryRaster {
    /// Builds a raster by asking `lit(row, col)` for every cell.
    pub fn from_fn(width: u32, height: u32, mut lit: impl FnMut(u32, u32) -> bool) -> Self {
        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            for col in 0..width {
                cells.push(lit(row, col));
            }
        }
        Self { width, height, cells }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Cell at `(row, col)`. Panics when out of bounds.
    #[inline]
    pub fn get(&self, row: u32, col: u32) -> bool {
        assert!(row < self.height && col < self.width, "cell ({row}, {col}) out of bounds");
        self.cells[(row * self.width + col) as usize]
    }

    pub fn lit_count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }
}

/// Perceptual (BT.601) luminance, rounded to the nearest integer.
///
/// Uses 14-bit fixed point weights so results do not depend on float rounding.
pub fn luminance(px: Rgb<u8>) -> u8 {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    let [r, g, b] = px.0;
    ((u32::from(r) * R + u32::from(g) * G + u32::from(b) * B + (1 << 13)) >> 14) as u8
}

/// Resamples, converts to luminance and thresholds frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binarizer {
    width: u32,
    height: u32,
    threshold: u8,
    invert: bool,
    crop: CropRect,
    filter: ResizeFilter,
}

impl Binarizer {
    pub fn new(width: u32, height: u32, threshold: u8) -> Self {
        Self {
            width,
            height,
            threshold,
            invert: false,
            crop: CropRect::default(),
            filter: ResizeFilter::default(),
        }
    }

    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            width: config.output_width,
            height: config.output_height,
            threshold: config.threshold,
            invert: config.invert,
            crop: config.crop,
            filter: config.filter,
        }
    }

    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_filter(mut self, filter: ResizeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Whether a pixel with luminance `luma` is lit.
    #[inline]
    pub fn is_lit(&self, luma: u8) -> bool {
        (luma > self.threshold) != self.invert
    }

    /// Reduces `frame` to a `width` x `height` raster.
    ///
    /// A crop that does not fit the frame is ignored; callers validate crops
    /// against the source size before decoding.
    pub fn binarize(&self, frame: &RawFrame) -> BinaryRaster {
        let source = frame.image();
        let resized = match self.crop.region(source.width(), source.height()) {
            Ok((x, y, w, h)) if !self.crop.is_empty() => {
                let cropped = imageops::crop_imm(source, x, y, w, h).to_image();
                self.resize(cropped)
            }
            _ => self.resize(source.clone()),
        };

        BinaryRaster::from_fn(self.width, self.height, |row, col| {
            self.is_lit(luminance(*resized.get_pixel(col, row)))
        })
    }

    fn resize(&self, img: RgbImage) -> RgbImage {
        if img.dimensions() == (self.width, self.height) {
            return img;
        }
        DynamicImage::ImageRgb8(img)
            .resize_exact(self.width, self.height, self.filter.filter_type())
            .to_rgb8()
    }
}
