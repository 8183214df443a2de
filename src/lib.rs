//! # picomovie - monochrome movie data for small OLED displays
//!
//! `picomovie` turns a video into a C header holding a sequence of 1-bit
//! frames packed into 64-bit words, ready to be played back by a
//! microcontroller driving a 128-pixel-wide OLED panel.
//!
//! ## Features
//!
//! - Frame sampling at any rate that evenly divides the source rate
//! - Threshold binarization with optional cropping, inversion and ffmpeg
//!   preprocessing filters
//! - Row-major packing for images up to 64 pixels wide, rotated
//!   column-major packing for wider ones
//! - Templated output with the metadata the player needs
//! - Progress reporting and cancellation for integration with UIs
//!
//! ## Example
//!
//! ```no_run
//! use picomovie::{MovieConverter, VideoOptions, VideoSource};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = MovieConverter::new();
//! let video = converter.open_video(Path::new("input.mp4"), None)?;
//! let config = converter.conversion_config("default", video.info())?;
//! let result = converter.convert_video_with_progress(
//!     video,
//!     Path::new("out"),
//!     &config,
//!     &VideoOptions::default(),
//!     |progress| println!("{}", progress.message),
//! )?;
//! println!("{} frames written to {}", result.frame_count, result.output.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Lower-level use
//!
//! The stages are public: [`FrameSampler`] picks frame indices,
//! [`Binarizer`] reduces frames, [`pack`] serializes rasters and
//! [`OutputAssembler`] renders the asset. [`ConversionPipeline`] ties them
//! together for one run and [`spawn`] runs it on a worker thread.

pub mod assembler;
pub mod config;
pub mod error;
pub mod packing;
pub mod pipeline;
pub mod preprocessing;
pub mod preview;
pub mod raster;
pub mod sampler;
pub mod video;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use assembler::{write_asset, AssetMetadata, OutputAssembler, Template, TemplateSource};
pub use config::{
    AppConfig, ConversionConfig, CropRect, FfmpegConfig, HardwareProfile, Preset, ResizeFilter,
};
pub use error::{ConvertError, Result};
pub use packing::{pack, PackedFrame, PackingMode};
pub use pipeline::{
    spawn, CancelToken, ConversionHandle, ConversionPipeline, ConversionResult, PipelineEvent,
    PipelineState,
};
pub use raster::{Binarizer, BinaryRaster};
pub use sampler::FrameSampler;
pub use video::{FfmpegVideo, RawFrame, SyntheticVideo, VideoError, VideoInfo, VideoSource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Represents the current phase of a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Decoding, binarizing and packing frames
    PackingFrames,
    /// Asset written
    Complete,
}

/// Progress information for a conversion
///
/// This struct provides detailed progress information that can be used
/// to display progress in UI applications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Current phase of the conversion
    pub phase: ProgressPhase,
    /// Number of frames packed so far
    pub completed: usize,
    /// Total number of frames the run will pack
    pub total: usize,
    /// Percentage complete (0.0 to 100.0)
    pub percentage: f64,
    /// Source index of the frame just packed
    pub frame_index: Option<u64>,
    /// Human-readable message describing current status
    pub message: String,
}

impl Progress {
    /// Progress update for one packed frame
    pub fn packed_frame(completed: usize, total: usize, frame_index: u64) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            phase: ProgressPhase::PackingFrames,
            completed,
            total,
            percentage,
            frame_index: Some(frame_index),
            message: format!("frame: {} done!", frame_index),
        }
    }

    /// Completion update carrying the written path
    pub fn complete(total_frames: usize, output: &Path) -> Self {
        Self {
            phase: ProgressPhase::Complete,
            completed: total_frames,
            total: total_frames,
            percentage: 100.0,
            frame_index: None,
            message: format!("saved: {}", output.display()),
        }
    }
}

/// Options that shape how frames are read and written, beyond the
/// per-run [`ConversionConfig`].
#[derive(Debug, Clone, Default)]
pub struct VideoOptions {
    /// Template to fill; the built-in C header when unset
    pub template: TemplateSource,
    /// Cancellation flag shared with the caller
    pub cancel: Option<CancelToken>,
}

/// Main converter struct for movie data generation
pub struct MovieConverter {
    config: AppConfig,
}

impl MovieConverter {
    /// Create a new converter with default configuration
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    /// Create a converter with custom configuration
    pub fn with_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Load configuration from a JSON or TOML file
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Ok(Self {
            config: AppConfig::from_file(path)?,
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Open a video with ffmpeg, optionally through a preprocessing filter
    pub fn open_video(&self, input: &Path, preprocess: Option<&str>) -> Result<FfmpegVideo> {
        FfmpegVideo::open(input, &self.config.ffmpeg, preprocess).map_err(|source| {
            ConvertError::VideoOpen {
                path: input.to_path_buf(),
                source,
            }
        })
    }

    /// Build a run configuration from a preset, covering the whole video
    pub fn conversion_config(&self, preset_name: &str, info: &VideoInfo) -> Result<ConversionConfig> {
        let preset = self
            .config
            .preset(preset_name)
            .ok_or_else(|| ConvertError::Config(format!("Preset '{}' not found", preset_name)))?;
        let last = info.last_frame_index().ok_or(ConvertError::EmptyVideo)?;
        Ok(ConversionConfig::default()
            .with_size(preset.width, preset.height)
            .with_threshold(preset.threshold)
            .with_range(0, last)
            .with_frame_rates(info.frame_rate, preset.fps)
            .with_filter(self.config.filter))
    }

    /// Resolve where the asset goes: directories get the configured file name
    pub fn output_path(&self, out: &Path) -> PathBuf {
        if out.is_dir() {
            out.join(&self.config.output_name)
        } else {
            out.to_path_buf()
        }
    }

    /// Convert a video into movie data
    pub fn convert_video<V: VideoSource>(
        &self,
        video: V,
        out: &Path,
        config: &ConversionConfig,
        options: &VideoOptions,
    ) -> Result<ConversionResult> {
        self.convert_video_with_progress(video, out, config, options, |_| {})
    }

    /// Convert a video into movie data, reporting each packed frame
    ///
    /// # Example
    ///
    /// ```no_run
    /// use picomovie::{MovieConverter, ProgressPhase, VideoOptions, VideoSource};
    /// use std::path::Path;
    ///
    /// let converter = MovieConverter::new();
    /// let video = converter.open_video(Path::new("video.mp4"), None).unwrap();
    /// let config = converter.conversion_config("small", video.info()).unwrap();
    ///
    /// converter.convert_video_with_progress(
    ///     video,
    ///     Path::new("MovieData.h"),
    ///     &config,
    ///     &VideoOptions::default(),
    ///     |progress| match progress.phase {
    ///         ProgressPhase::PackingFrames => {
    ///             println!("{}/{} ({:.1}%)", progress.completed, progress.total, progress.percentage)
    ///         }
    ///         ProgressPhase::Complete => println!("{}", progress.message),
    ///     },
    /// ).unwrap();
    /// ```
    pub fn convert_video_with_progress<V, F>(
        &self,
        video: V,
        out: &Path,
        config: &ConversionConfig,
        options: &VideoOptions,
        progress_callback: F,
    ) -> Result<ConversionResult>
    where
        V: VideoSource,
        F: Fn(Progress),
    {
        let mut pipeline = ConversionPipeline::new(video, config.clone())
            .with_profile(self.config.hardware)
            .with_template(options.template.clone())
            .with_output(self.output_path(out));
        if let Some(cancel) = &options.cancel {
            pipeline = pipeline.with_cancel_token(cancel.clone());
        }

        pipeline.run(|event| match event {
            PipelineEvent::Progress(progress) => progress_callback(progress),
            PipelineEvent::Completed { frame_count, output } => {
                progress_callback(Progress::complete(frame_count, &output))
            }
            PipelineEvent::Failed { .. } | PipelineEvent::Cancelled { .. } => {}
        })
    }

    /// Binarize a single frame, e.g. to check a threshold before converting
    pub fn preview_frame<V: VideoSource>(
        &self,
        video: &mut V,
        index: u64,
        config: &ConversionConfig,
    ) -> Result<BinaryRaster> {
        let frame = video
            .decode_frame(index)
            .map_err(|source| ConvertError::FrameDecode { index, source })?;
        Ok(Binarizer::from_config(config).binarize(&frame))
    }
}

impl Default for MovieConverter {
    fn default() -> Self {
        Self::new()
    }
}
