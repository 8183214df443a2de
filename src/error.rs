//! Error kinds surfaced by a conversion run.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

use crate::packing::PackingMode;
use crate::video::VideoError;

/// Everything that can stop a conversion.
///
/// Validation variants are reported before any frame is decoded. Decode and
/// finalization variants abort the run and discard the frames packed so far.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("target fps {target_fps} must evenly divide source fps {source_fps}")]
    InvalidFrameRateRatio { source_fps: u32, target_fps: u32 },

    #[error("end frame ({end}) must be greater than start frame ({start})")]
    InvalidFrameRange { start: u64, end: u64 },

    #[error("end frame {end} is past the last frame of the video ({last})")]
    EndFrameOutOfRange { end: u64, last: u64 },

    #[error("invalid output size {width}x{height}: {reason}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("no output path was given")]
    MissingOutputPath,

    #[error("could not open video {}", path.display())]
    VideoOpen {
        path: PathBuf,
        #[source]
        source: VideoError,
    },

    #[error("the video contains no frames")]
    EmptyVideo,

    #[error("failed to decode frame {index}")]
    FrameDecode {
        index: u64,
        #[source]
        source: VideoError,
    },

    #[error("could not read template {}", path.display())]
    TemplateLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("could not write {}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("frame packed as {found:?} with {found_words} words, expected {expected:?} with {expected_words}")]
    MismatchedFrame {
        expected: PackingMode,
        expected_words: usize,
        found: PackingMode,
        found_words: usize,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("this pipeline has already been started")]
    AlreadyStarted,

    #[error("conversion cancelled after {frames_packed} frames")]
    Cancelled { frames_packed: usize },
}

impl ConvertError {
    /// True for errors raised before the first frame is touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ConvertError::InvalidFrameRateRatio { .. }
                | ConvertError::InvalidFrameRange { .. }
                | ConvertError::EndFrameOutOfRange { .. }
                | ConvertError::InvalidDimensions { .. }
                | ConvertError::MissingOutputPath
                | ConvertError::EmptyVideo
                | ConvertError::Config(_)
        )
    }

    /// The message followed by every underlying cause, `: `-separated.
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut cause = StdError::source(self);
        while let Some(err) = cause {
            message.push_str(": ");
            message.push_str(&err.to_string());
            cause = err.source();
        }
        message
    }
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
