//! Video sources: the ffmpeg-backed decoder and a synthetic source.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::FfmpegConfig;

/// Errors raised while probing or decoding a video.
#[derive(Debug, Error)]
pub enum VideoError {
    #[error("failed to run {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with status {code}: {stderr}")]
    NonZeroExit {
        program: String,
        code: i32,
        stderr: String,
    },
    #[error("failed to parse ffprobe output")]
    Parse(#[from] serde_json::Error),
    #[error("no video stream found")]
    NoVideoStream,
    #[error("unreadable frame rate '{0}'")]
    FrameRate(String),
    #[error("video does not report a frame count")]
    UnknownFrameCount,
    #[error("frame {index} is past the end of the stream")]
    EndOfStream { index: u64 },
    #[error("reading decoded frame data")]
    Io(#[from] io::Error),
    #[error("pixel buffer of {len} bytes does not match a {width}x{height} rgb frame")]
    BufferSize { width: u32, height: u32, len: usize },
    #[error("{0}")]
    Synthetic(String),
}

/// One decoded frame, 8-bit RGB.
#[derive(Debug, Clone)]
pub struct RawFrame {
    image: RgbImage,
}

impl RawFrame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Wraps a packed `rgb24` buffer.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, VideoError> {
        let len = pixels.len();
        if len != width as usize * height as usize * 3 {
            return Err(VideoError::BufferSize { width, height, len });
        }
        RgbImage::from_raw(width, height, pixels)
            .map(Self::new)
            .ok_or(VideoError::BufferSize { width, height, len })
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Stream properties reported by a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
    /// Frame rate rounded half up to a whole number.
    pub frame_rate: u32,
    /// Frame rate as reported by the container.
    pub exact_frame_rate: f64,
}

impl VideoInfo {
    pub fn last_frame_index(&self) -> Option<u64> {
        self.frame_count.checked_sub(1)
    }
}

/// A seekable sequence of decoded frames.
///
/// Decoding is stateful: a source serves one caller at a time and is owned
/// by the pipeline for the length of a run.
pub trait VideoSource {
    fn info(&self) -> &VideoInfo;

    /// Decodes the frame at `index` (0-based).
    fn decode_frame(&mut self, index: u64) -> Result<RawFrame, VideoError>;

    fn frame_count(&self) -> u64 {
        self.info().frame_count
    }

    fn frame_rate(&self) -> u32 {
        self.info().frame_rate
    }
}

impl<V: VideoSource + ?Sized> VideoSource for Box<V> {
    fn info(&self) -> &VideoInfo {
        (**self).info()
    }

    fn decode_frame(&mut self, index: u64) -> Result<RawFrame, VideoError> {
        (**self).decode_frame(index)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
}

/// Parses an ffprobe rational such as `30000/1001`. Zero rates are rejected.
fn parse_rate(text: &str) -> Option<f64> {
    let rate = match text.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => text.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn round_half_up(value: f64) -> u32 {
    (value + 0.5).floor() as u32
}

fn parse_probe(json: &[u8]) -> Result<VideoInfo, VideoError> {
    let output: FfprobeOutput = serde_json::from_slice(json)?;
    let stream = output
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref().map_or(true, |t| t == "video"))
        .ok_or(VideoError::NoVideoStream)?;

    let width = stream.width.ok_or(VideoError::NoVideoStream)?;
    let height = stream.height.ok_or(VideoError::NoVideoStream)?;

    let exact_frame_rate = [&stream.avg_frame_rate, &stream.r_frame_rate]
        .into_iter()
        .flatten()
        .find_map(|r| parse_rate(r))
        .ok_or_else(|| {
            VideoError::FrameRate(
                stream
                    .avg_frame_rate
                    .clone()
                    .or(stream.r_frame_rate.clone())
                    .unwrap_or_default(),
            )
        })?;

    let frame_count = [&stream.nb_frames, &stream.nb_read_packets]
        .into_iter()
        .flatten()
        .find_map(|n| n.trim().parse::<u64>().ok().filter(|n| *n > 0))
        .ok_or(VideoError::UnknownFrameCount)?;

    Ok(VideoInfo {
        width,
        height,
        frame_count,
        frame_rate: round_half_up(exact_frame_rate),
        exact_frame_rate,
    })
}

/// Probes the first video stream of `path` with ffprobe.
pub fn probe_video(path: &Path, ffmpeg: &FfmpegConfig) -> Result<VideoInfo, VideoError> {
    let program = ffmpeg.ffprobe_cmd();
    let output = Command::new(program)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-count_packets",
            "-show_entries",
            "stream=codec_type,width,height,avg_frame_rate,r_frame_rate,nb_frames,nb_read_packets",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|source| VideoError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(VideoError::NonZeroExit {
            program: program.display().to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_probe(&output.stdout)
}

/// Bytes of ffmpeg diagnostics kept for error reports; older output is dropped.
const STDERR_TAIL: usize = 16 * 1024;

/// Reads `pipe` to the end on a helper thread so ffmpeg never blocks on a
/// full stderr pipe. Returns the last `STDERR_TAIL` bytes.
fn drain_stderr(mut pipe: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut tail = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    tail.extend_from_slice(&chunk[..n]);
                    if tail.len() > STDERR_TAIL {
                        tail.drain(..tail.len() - STDERR_TAIL);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&tail).into_owned()
    })
}

/// A running ffmpeg process emitting raw rgb24 frames on stdout.
struct FrameStream {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    next_index: u64,
}

impl FrameStream {
    fn finish_with_error(&mut self, index: u64, program: &Path) -> VideoError {
        let status = self.child.wait();
        let stderr = self
            .stderr
            .take()
            .map(|reader| reader.join().unwrap_or_default())
            .unwrap_or_default();
        match status {
            Ok(status) if !status.success() => VideoError::NonZeroExit {
                program: program.display().to_string(),
                code: status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            },
            _ => VideoError::EndOfStream { index },
        }
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Decodes frames by streaming rawvideo out of an ffmpeg child process.
///
/// Frames are read forward from the current position; asking for a frame
/// behind it restarts the decoder.
pub struct FfmpegVideo {
    path: PathBuf,
    ffmpeg: FfmpegConfig,
    filter: Option<String>,
    info: VideoInfo,
    stream: Option<FrameStream>,
}

impl std::fmt::Debug for FfmpegVideo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegVideo")
            .field("path", &self.path)
            .field("filter", &self.filter)
            .field("info", &self.info)
            .field("streaming", &self.stream.is_some())
            .finish()
    }
}

impl FfmpegVideo {
    /// Opens `path`, probing its size, rate and frame count.
    ///
    /// `filter` is an ffmpeg `-vf` chain applied before frames are handed
    /// out. Its output is scaled back to the probed size.
    pub fn open(path: &Path, ffmpeg: &FfmpegConfig, filter: Option<&str>) -> Result<Self, VideoError> {
        let info = probe_video(path, ffmpeg)?;
        info!(
            "opened {} ({}x{}, {} frames at {:.3} fps)",
            path.display(),
            info.width,
            info.height,
            info.frame_count,
            info.exact_frame_rate
        );
        Ok(Self {
            path: path.to_path_buf(),
            ffmpeg: ffmpeg.clone(),
            filter: filter.map(str::to_string),
            info,
            stream: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn frame_len(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 3
    }

    /// The decoder invocation. Rotation metadata is ignored so frames keep
    /// the coded size that ffprobe reports.
    fn decode_command(&self) -> Command {
        let mut cmd = Command::new(self.ffmpeg.ffmpeg_cmd());
        cmd.arg("-loglevel")
            .arg("error")
            .arg("-nostdin")
            .arg("-noautorotate")
            .arg("-i")
            .arg(&self.path)
            .args(["-map", "0:v:0", "-an", "-sn"]);
        if let Some(vf) = crate::preprocessing::build_decode_vf(
            self.filter.as_deref(),
            self.info.width,
            self.info.height,
        ) {
            cmd.arg("-vf").arg(vf);
        }
        cmd.args(["-fps_mode", "passthrough", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn spawn_stream(&self) -> Result<FrameStream, VideoError> {
        let program = self.ffmpeg.ffmpeg_cmd();
        let mut cmd = self.decode_command();

        debug!("spawning {:?}", cmd);
        let mut child = cmd.spawn().map_err(|source| VideoError::Spawn {
            program: program.display().to_string(),
            source,
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            VideoError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "ffmpeg stdout unavailable"))
        })?;
        let stderr = child.stderr.take().map(drain_stderr);
        Ok(FrameStream {
            child,
            stdout,
            stderr,
            next_index: 0,
        })
    }
}

impl VideoSource for FfmpegVideo {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn decode_frame(&mut self, index: u64) -> Result<RawFrame, VideoError> {
        let behind = self.stream.as_ref().map_or(true, |s| s.next_index > index);
        if behind {
            self.stream = Some(self.spawn_stream()?);
        }

        let frame_len = self.frame_len();
        let program = self.ffmpeg.ffmpeg_cmd().to_path_buf();
        let mut buf = vec![0u8; frame_len];
        let result = {
            let Some(stream) = self.stream.as_mut() else {
                return Err(VideoError::EndOfStream { index });
            };
            loop {
                match stream.stdout.read_exact(&mut buf) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                        break Err(stream.finish_with_error(index, &program));
                    }
                    Err(e) => break Err(VideoError::Io(e)),
                }
                let current = stream.next_index;
                stream.next_index += 1;
                if current == index {
                    break Ok(());
                }
            }
        };

        match result {
            Ok(()) => RawFrame::from_rgb(self.info.width, self.info.height, buf),
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }
}

/// Deterministic in-memory source: a diagonal stripe pattern that moves one
/// pixel per frame.
#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    info: VideoInfo,
    fail_at: Option<u64>,
    decoded: Vec<u64>,
}

impl SyntheticVideo {
    pub fn new(width: u32, height: u32, frame_count: u64, frame_rate: u32) -> Self {
        Self {
            info: VideoInfo {
                width,
                height,
                frame_count,
                frame_rate,
                exact_frame_rate: f64::from(frame_rate),
            },
            fail_at: None,
            decoded: Vec::new(),
        }
    }

    /// Makes decoding of frame `index` fail.
    pub fn with_failure_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Indices decoded so far, in call order.
    pub fn decoded(&self) -> &[u64] {
        &self.decoded
    }

    fn pixel(index: u64, x: u32, y: u32) -> u8 {
        if (u64::from(x) + u64::from(y) + index) % 16 < 8 {
            230
        } else {
            20
        }
    }
}

impl VideoSource for SyntheticVideo {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn decode_frame(&mut self, index: u64) -> Result<RawFrame, VideoError> {
        if self.fail_at == Some(index) {
            return Err(VideoError::Synthetic(format!("corrupt frame {index}")));
        }
        if index >= self.info.frame_count {
            return Err(VideoError::EndOfStream { index });
        }
        self.decoded.push(index);
        let image = RgbImage::from_fn(self.info.width, self.info.height, |x, y| {
            let v = Self::pixel(index, x, y);
            image::Rgb([v, v, v])
        });
        Ok(RawFrame::new(image))
    }
}
