//! Frame index selection for a target playback rate.

use std::iter::StepBy;
use std::ops::RangeInclusive;

use crate::error::{ConvertError, Result};

/// Selects every `stride`-th frame between `start` and `end` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSampler {
    start: u64,
    end: u64,
    stride: u64,
}

impl FrameSampler {
    /// Fails unless `target_fps` divides `source_fps` exactly.
    pub fn new(start: u64, end: u64, source_fps: u32, target_fps: u32) -> Result<Self> {
        let stride = Self::stride_for(source_fps, target_fps)?;
        Ok(Self { start, end, stride: u64::from(stride) })
    }

    pub fn stride_for(source_fps: u32, target_fps: u32) -> Result<u32> {
        if target_fps == 0 || source_fps == 0 || source_fps % target_fps != 0 {
            return Err(ConvertError::InvalidFrameRateRatio { source_fps, target_fps });
        }
        Ok(source_fps / target_fps)
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Number of indices the sampler yields.
    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            let steps = (self.end - self.start) / self.stride;
            usize::try_from(steps)
                .ok()
                .and_then(|steps| steps.checked_add(1))
                .unwrap_or(usize::MAX)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fresh iterator over the selected indices; may be called any number of times.
    pub fn indices(&self) -> StepBy<RangeInclusive<u64>> {
        let step = usize::try_from(self.stride).unwrap_or(usize::MAX);
        (self.start..=self.end).step_by(step)
    }
}

impl IntoIterator for &FrameSampler {
    type Item = u64;
    type IntoIter = StepBy<RangeInclusive<u64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.indices()
    }
}
