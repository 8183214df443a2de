//! Orchestration of one conversion run.
//!
//! A [`ConversionPipeline`] is built per run, owns its video source for the
//! whole run and walks `Idle -> Running -> Completed | Failed | Cancelled`.
//! Frames are processed strictly in order on the calling thread; use
//! [`spawn`] to run it on a worker thread and read events from a channel.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::assembler::{write_asset, OutputAssembler, TemplateSource};
use crate::config::{ConversionConfig, HardwareProfile};
use crate::error::{ConvertError, Result};
use crate::packing::{pack, PackingMode};
use crate::raster::Binarizer;
use crate::sampler::FrameSampler;
use crate::video::VideoSource;
use crate::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Messages emitted while a pipeline runs.
///
/// One `Progress` per packed frame in sampling order, then exactly one of
/// the terminal variants.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Progress(Progress),
    Completed { frame_count: usize, output: PathBuf },
    Failed { message: String },
    Cancelled { frames_packed: usize },
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Progress(_))
    }
}

/// Shared flag checked between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub frame_count: usize,
    pub mode: PackingMode,
    pub asset: String,
    pub output: PathBuf,
}

pub struct ConversionPipeline<V> {
    video: V,
    config: ConversionConfig,
    profile: HardwareProfile,
    template: TemplateSource,
    output: Option<PathBuf>,
    cancel: CancelToken,
    state: PipelineState,
}

impl<V: VideoSource> ConversionPipeline<V> {
    pub fn new(video: V, config: ConversionConfig) -> Self {
        Self {
            video,
            config,
            profile: HardwareProfile::default(),
            template: TemplateSource::default(),
            output: None,
            cancel: CancelToken::new(),
            state: PipelineState::Idle,
        }
    }

    pub fn with_profile(mut self, profile: HardwareProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_template(mut self, template: TemplateSource) -> Self {
        self.template = template;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn video(&self) -> &V {
        &self.video
    }

    /// Checks the configuration against the profile and the opened video.
    pub fn validate(&self) -> Result<FrameSampler> {
        self.config.validate(&self.profile)?;

        match &self.output {
            Some(path) if !path.as_os_str().is_empty() => {}
            _ => return Err(ConvertError::MissingOutputPath),
        }

        let info = self.video.info();
        let last = info.last_frame_index().ok_or(ConvertError::EmptyVideo)?;
        if self.config.end_frame > last {
            return Err(ConvertError::EndFrameOutOfRange {
                end: self.config.end_frame,
                last,
            });
        }
        if !self.config.crop.is_empty() {
            self.config.crop.region(info.width, info.height)?;
        }
        if info.frame_rate != self.config.source_frame_rate {
            warn!(
                "configured source rate {} fps differs from the video's {} fps",
                self.config.source_frame_rate, info.frame_rate
            );
        }

        FrameSampler::new(
            self.config.start_frame,
            self.config.end_frame,
            self.config.source_frame_rate,
            self.config.target_frame_rate,
        )
    }

    /// Runs the conversion, reporting to `on_event`.
    ///
    /// A pipeline runs once; later calls fail with `AlreadyStarted`.
    pub fn run<F>(&mut self, on_event: F) -> Result<ConversionResult>
    where
        F: Fn(PipelineEvent),
    {
        if self.state != PipelineState::Idle {
            return Err(ConvertError::AlreadyStarted);
        }
        self.state = PipelineState::Running;

        let result = self.execute(&on_event);
        match &result {
            Ok(done) => {
                self.state = PipelineState::Completed;
                on_event(PipelineEvent::Completed {
                    frame_count: done.frame_count,
                    output: done.output.clone(),
                });
            }
            Err(ConvertError::Cancelled { frames_packed }) => {
                self.state = PipelineState::Cancelled;
                info!("conversion cancelled after {} frames", frames_packed);
                on_event(PipelineEvent::Cancelled {
                    frames_packed: *frames_packed,
                });
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                warn!("conversion failed: {}", e.report());
                on_event(PipelineEvent::Failed { message: e.report() });
            }
        }
        result
    }

    fn execute<F>(&mut self, on_event: &F) -> Result<ConversionResult>
    where
        F: Fn(PipelineEvent),
    {
        let sampler = self.validate()?;
        let output = self.output.clone().ok_or(ConvertError::MissingOutputPath)?;

        let binarizer = Binarizer::from_config(&self.config);
        let mut assembler = OutputAssembler::new(&self.config, self.profile);
        let mode = assembler.mode();
        let total = sampler.len();
        info!(
            "packing {} frames ({}x{}, every {} frame(s), {:?})",
            total,
            self.config.output_width,
            self.config.output_height,
            sampler.stride(),
            mode
        );

        for index in sampler.indices() {
            if self.cancel.is_cancelled() {
                return Err(ConvertError::Cancelled {
                    frames_packed: assembler.frame_count(),
                });
            }

            let frame = self
                .video
                .decode_frame(index)
                .map_err(|source| ConvertError::FrameDecode { index, source })?;
            let raster = binarizer.binarize(&frame);
            assembler.push(&pack(&raster, mode))?;

            debug!(index, lit = raster.lit_count(), "packed frame");
            on_event(PipelineEvent::Progress(Progress::packed_frame(
                assembler.frame_count(),
                total,
                index,
            )));
        }

        let template = self.template.load()?;
        let asset = assembler.render(&template);
        write_asset(&output, &asset)?;
        info!("saved: {}", output.display());

        Ok(ConversionResult {
            frame_count: assembler.frame_count(),
            mode,
            asset,
            output,
        })
    }
}

/// A pipeline running on a worker thread.
pub struct ConversionHandle {
    events: Receiver<PipelineEvent>,
    cancel: CancelToken,
    join: JoinHandle<Result<ConversionResult>>,
}

impl ConversionHandle {
    /// Events in emission order; the iterator ends once the run is over.
    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Waits for the run to end. A panic on the worker is resumed here.
    pub fn join(self) -> Result<ConversionResult> {
        match self.join.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Starts `pipeline` on its own thread.
pub fn spawn<V>(mut pipeline: ConversionPipeline<V>) -> ConversionHandle
where
    V: VideoSource + Send + 'static,
{
    let (tx, events) = mpsc::channel();
    let cancel = pipeline.cancel_token();
    let join = thread::spawn(move || {
        pipeline.run(move |event| {
            // A receiver that went away just stops listening.
            let _ = tx.send(event);
        })
    });
    ConversionHandle { events, cancel, join }
}
