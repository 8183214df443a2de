//! Run configuration, hardware profile and the optional config file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::packing::PackingMode;

/// Physical characteristics of the target display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareProfile {
    /// Widest image the display can show, in pixels.
    pub display_max_width: u32,
    /// Bits per display memory page. Packed words never exceed 64 bits.
    pub page_bits: u32,
}

impl Default for HardwareProfile {
    fn default() -> Self {
        Self {
            display_max_width: 128,
            page_bits: 64,
        }
    }
}

impl HardwareProfile {
    pub fn validate(&self) -> Result<()> {
        if self.display_max_width == 0 {
            return Err(ConvertError::Config(
                "display_max_width must be at least 1".into(),
            ));
        }
        if self.page_bits == 0 || self.page_bits > u64::BITS {
            return Err(ConvertError::Config(format!(
                "page_bits must be between 1 and {}, got {}",
                u64::BITS,
                self.page_bits
            )));
        }
        Ok(())
    }

    /// Horizontal position that centers an image of `width` pixels.
    ///
    /// Widths larger than the display produce a negative offset.
    pub fn centering_offset(&self, width: u32) -> i64 {
        (i64::from(self.display_max_width) - i64::from(width)).div_euclid(2) + 1
    }
}

/// Resampling kernel used when shrinking frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl ResizeFilter {
    pub fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Pixels trimmed from each edge of the source frame before resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CropRect {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl CropRect {
    pub fn is_empty(&self) -> bool {
        self.top == 0 && self.bottom == 0 && self.left == 0 && self.right == 0
    }

    /// Returns `(x, y, width, height)` of the kept region, or an error when
    /// nothing would be left.
    pub fn region(&self, frame_width: u32, frame_height: u32) -> Result<(u32, u32, u32, u32)> {
        let rows = u64::from(self.top) + u64::from(self.bottom);
        let cols = u64::from(self.left) + u64::from(self.right);
        if rows >= u64::from(frame_height) {
            return Err(ConvertError::InvalidDimensions {
                width: frame_width,
                height: frame_height,
                reason: format!(
                    "crop rows ({} top + {} bottom = {}) exceed frame height",
                    self.top, self.bottom, rows
                ),
            });
        }
        if cols >= u64::from(frame_width) {
            return Err(ConvertError::InvalidDimensions {
                width: frame_width,
                height: frame_height,
                reason: format!(
                    "crop columns ({} left + {} right = {}) exceed frame width",
                    self.left, self.right, cols
                ),
            });
        }
        Ok((
            self.left,
            self.top,
            frame_width - self.left - self.right,
            frame_height - self.top - self.bottom,
        ))
    }
}

/// Everything one conversion run needs to know.
///
/// Built by the caller and handed to a fresh pipeline; it is not modified
/// once the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionConfig {
    pub output_width: u32,
    pub output_height: u32,
    pub start_frame: u64,
    pub end_frame: u64,
    pub threshold: u8,
    pub source_frame_rate: u32,
    pub target_frame_rate: u32,
    pub invert: bool,
    pub crop: CropRect,
    pub filter: ResizeFilter,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_width: 114,
            output_height: 64,
            start_frame: 0,
            end_frame: 1,
            threshold: 150,
            source_frame_rate: 24,
            target_frame_rate: 24,
            invert: false,
            crop: CropRect::default(),
            filter: ResizeFilter::default(),
        }
    }
}

impl ConversionConfig {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.output_width = width;
        self.output_height = height;
        self
    }

    pub fn with_range(mut self, start: u64, end: u64) -> Self {
        self.start_frame = start;
        self.end_frame = end;
        self
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_frame_rates(mut self, source: u32, target: u32) -> Self {
        self.source_frame_rate = source;
        self.target_frame_rate = target;
        self
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

    /// Packing layout this configuration produces on `profile`.
    pub fn packing_mode(&self, profile: &HardwareProfile) -> PackingMode {
        PackingMode::select(self.output_width, profile.page_bits)
    }

    /// Checks everything that can be checked without opening the video.
    pub fn validate(&self, profile: &HardwareProfile) -> Result<()> {
        profile.validate()?;

        if self.target_frame_rate == 0
            || self.source_frame_rate == 0
            || self.source_frame_rate % self.target_frame_rate != 0
        {
            return Err(ConvertError::InvalidFrameRateRatio {
                source_fps: self.source_frame_rate,
                target_fps: self.target_frame_rate,
            });
        }

        if self.start_frame >= self.end_frame {
            return Err(ConvertError::InvalidFrameRange {
                start: self.start_frame,
                end: self.end_frame,
            });
        }

        if self.output_width == 0 || self.output_height == 0 {
            return Err(ConvertError::InvalidDimensions {
                width: self.output_width,
                height: self.output_height,
                reason: "width and height must be at least 1".into(),
            });
        }

        let page_bits = profile.page_bits;
        match self.packing_mode(profile) {
            PackingMode::RowMajor64 => {}
            PackingMode::ColumnMajor64Rotated if self.output_height > page_bits => {
                return Err(ConvertError::InvalidDimensions {
                    width: self.output_width,
                    height: self.output_height,
                    reason: format!(
                        "images wider than {page_bits} pixels are rotated and must be at most {page_bits} pixels high"
                    ),
                });
            }
            PackingMode::ColumnMajor64Rotated => {}
        }
        Ok(())
    }
}

/// Where to find the ffmpeg tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

impl FfmpegConfig {
    pub fn ffmpeg_cmd(&self) -> &Path {
        self.ffmpeg_path
            .as_deref()
            .unwrap_or_else(|| Path::new("ffmpeg"))
    }

    pub fn ffprobe_cmd(&self) -> &Path {
        self.ffprobe_path
            .as_deref()
            .unwrap_or_else(|| Path::new("ffprobe"))
    }
}

/// Output size preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub width: u32,
    pub height: u32,
    pub threshold: u8,
    pub fps: u32,
}

fn default_preset_name() -> String {
    "default".to_string()
}

fn default_output_name() -> String {
    "MovieData.h".to_string()
}

fn default_presets() -> HashMap<String, Preset> {
    HashMap::from([
        (
            "default".to_string(),
            Preset { width: 114, height: 64, threshold: 150, fps: 24 },
        ),
        (
            "small".to_string(),
            Preset { width: 64, height: 32, threshold: 150, fps: 12 },
        ),
        (
            "wide".to_string(),
            Preset { width: 128, height: 64, threshold: 150, fps: 30 },
        ),
    ])
}

/// Application configuration loaded from `picomovie.json` / `picomovie.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_presets")]
    pub presets: HashMap<String, Preset>,
    #[serde(default = "default_preset_name")]
    pub default_preset: String,
    #[serde(default)]
    pub hardware: HardwareProfile,
    #[serde(default)]
    pub filter: ResizeFilter,
    #[serde(default = "default_output_name")]
    pub output_name: String,
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            presets: default_presets(),
            default_preset: default_preset_name(),
            hardware: HardwareProfile::default(),
            filter: ResizeFilter::default(),
            output_name: default_output_name(),
            ffmpeg: FfmpegConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parses a config file; `.toml` files are read as TOML, anything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::Config(format!("reading config {}: {}", path.display(), e))
        })?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let config: AppConfig = if is_toml {
            toml::from_str(&text).map_err(|e| {
                ConvertError::Config(format!("parsing {}: {}", path.display(), e))
            })?
        } else {
            serde_json::from_str(&text).map_err(|e| {
                ConvertError::Config(format!("parsing {}: {}", path.display(), e))
            })?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.hardware.validate()?;
        if !self.presets.contains_key(&self.default_preset) {
            return Err(ConvertError::Config(format!(
                "default preset '{}' is not defined",
                self.default_preset
            )));
        }
        if self.output_name.trim().is_empty() {
            return Err(ConvertError::Config("output_name cannot be empty".into()));
        }
        Ok(())
    }

    pub fn preset(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }
}
