use picomovie::{
    spawn, ConversionConfig, ConversionPipeline, ConvertError, CropRect, PackingMode,
    PipelineEvent, PipelineState, RawFrame, SyntheticVideo, TemplateSource, VideoError, VideoInfo,
    VideoSource,
};
use std::fs;
use std::path::Path;

/// Every pixel of every frame has the same gray value.
struct SolidVideo {
    info: VideoInfo,
    value: u8,
}

impl SolidVideo {
    fn new(width: u32, height: u32, frame_count: u64, value: u8) -> Self {
        Self {
            info: VideoInfo {
                width,
                height,
                frame_count,
                frame_rate: 24,
                exact_frame_rate: 24.0,
            },
            value,
        }
    }
}

impl VideoSource for SolidVideo {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn decode_frame(&mut self, index: u64) -> Result<RawFrame, VideoError> {
        if index >= self.info.frame_count {
            return Err(VideoError::EndOfStream { index });
        }
        let len = (self.info.width * self.info.height * 3) as usize;
        RawFrame::from_rgb(self.info.width, self.info.height, vec![self.value; len])
    }
}

fn frame_literal(word: &str, count: usize) -> String {
    format!("  {{{}}}", vec![word; count].join(","))
}

fn run_to_file<V: VideoSource>(video: V, config: ConversionConfig, output: &Path) -> String {
    let mut pipeline = ConversionPipeline::new(video, config).with_output(output);
    let result = pipeline.run(|_| {}).unwrap();
    let written = fs::read_to_string(output).unwrap();
    assert_eq!(written, result.asset);
    written
}

#[test]
fn test_row_major_asset() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("MovieData.h");
    let config = ConversionConfig::default()
        .with_size(8, 8)
        .with_range(0, 3)
        .with_frame_rates(24, 24)
        .with_threshold(128);

    let asset = run_to_file(SolidVideo::new(32, 32, 4, 255), config, &output);

    assert!(asset.contains("#define MODE_64BIT\n"));
    assert!(asset.contains("#define MOVIE_WIDTH  64\n"));
    assert!(asset.contains("#define MOVIE_HEIGHT 8\n"));
    assert!(asset.contains("#define MOVIE_FPS    24\n"));
    assert!(asset.contains("#define MOVIE_FRAMES 4\n"));
    assert!(asset.contains("#define MOVIE_X_POS  61\n"));

    let frame = frame_literal("0xff", 8);
    let frames = vec![frame.as_str(); 4].join(",\n");
    assert!(asset.contains(&format!(
        "movie_data[MOVIE_FRAMES][MOVIE_HEIGHT] = {{\n{}\n}};",
        frames
    )));
}

#[test]
fn test_wide_output_is_rotated() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("MovieData.h");
    let config = ConversionConfig::default()
        .with_size(128, 64)
        .with_range(0, 1)
        .with_frame_rates(24, 24)
        .with_threshold(128);

    let mut pipeline = ConversionPipeline::new(SolidVideo::new(256, 128, 2, 0), config)
        .with_output(&output);
    let result = pipeline.run(|_| {}).unwrap();

    assert_eq!(result.mode, PackingMode::ColumnMajor64Rotated);
    assert!(result.asset.contains("#define MODE_64BIT_ROT\n"));
    assert!(result.asset.contains("#define MOVIE_WIDTH  128\n"));
    assert!(result.asset.contains("#define MOVIE_X_POS  1\n"));
    assert!(result.asset.contains("movie_data[MOVIE_FRAMES][MOVIE_WIDTH]"));
    let frame = frame_literal("0x0", 128);
    assert!(result.asset.contains(&format!("{},\n{}\n}};", frame, frame)));
}

#[test]
fn test_invert_and_threshold_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let base = ConversionConfig::default()
        .with_size(8, 2)
        .with_range(0, 1)
        .with_frame_rates(24, 24)
        .with_threshold(150);

    // A pixel equal to the threshold stays dark.
    let plain = run_to_file(
        SolidVideo::new(8, 2, 2, 150),
        base.clone(),
        &dir.path().join("plain.h"),
    );
    assert!(plain.contains(&frame_literal("0x0", 2)));

    let inverted = run_to_file(
        SolidVideo::new(8, 2, 2, 150),
        base.with_invert(true),
        &dir.path().join("inverted.h"),
    );
    assert!(inverted.contains(&frame_literal("0xff", 2)));
}

#[test]
fn test_repeated_runs_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConversionConfig::default()
        .with_size(48, 24)
        .with_range(2, 20)
        .with_frame_rates(30, 10)
        .with_threshold(100);

    let first = run_to_file(
        SyntheticVideo::new(96, 64, 30, 30),
        config.clone(),
        &dir.path().join("a.h"),
    );
    let second = run_to_file(
        SyntheticVideo::new(96, 64, 30, 30),
        config,
        &dir.path().join("b.h"),
    );
    assert_eq!(first, second);
    assert_eq!(
        fs::read(dir.path().join("a.h")).unwrap(),
        fs::read(dir.path().join("b.h")).unwrap()
    );
}

#[test]
fn test_half_rate_samples_every_other_frame() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConversionConfig::default()
        .with_size(16, 8)
        .with_range(0, 4)
        .with_frame_rates(30, 15)
        .with_threshold(128);
    let mut pipeline = ConversionPipeline::new(SyntheticVideo::new(32, 16, 10, 30), config)
        .with_output(dir.path().join("out.h"));

    let result = pipeline.run(|_| {}).unwrap();
    assert_eq!(result.frame_count, 3);
    assert_eq!(pipeline.video().decoded(), &[0, 2, 4]);
    assert!(result.asset.contains("#define MOVIE_FPS    15\n"));
    assert!(result.asset.contains("#define MOVIE_FRAMES 3\n"));
}

#[test]
fn test_bad_frame_rate_ratio_decodes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.h");
    let config = ConversionConfig::default()
        .with_size(16, 8)
        .with_range(0, 4)
        .with_frame_rates(30, 24);
    let mut pipeline =
        ConversionPipeline::new(SyntheticVideo::new(32, 16, 10, 30), config).with_output(&output);

    let err = pipeline.run(|_| {}).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::InvalidFrameRateRatio { source_fps: 30, target_fps: 24 }
    ));
    assert!(err.is_validation());
    assert!(pipeline.video().decoded().is_empty());
    assert!(!output.exists());
}

#[test]
fn test_inline_template() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConversionConfig::default()
        .with_size(8, 4)
        .with_range(0, 1)
        .with_frame_rates(24, 24)
        .with_threshold(128);
    let template = TemplateSource::Inline("{4} frames of {1}x{2} ({0})\n{7}\n".to_string());
    let mut pipeline = ConversionPipeline::new(SolidVideo::new(8, 4, 2, 255), config)
        .with_output(dir.path().join("frames.txt"))
        .with_template(template);

    let result = pipeline.run(|_| {}).unwrap();
    let frame = frame_literal("0xff", 4);
    assert_eq!(
        result.asset,
        format!("2 frames of 64x4 (MODE_64BIT)\n{},\n{}\n", frame, frame)
    );
}

#[test]
fn test_template_file() {
    let dir = tempfile::tempdir().unwrap();
    let template_path = dir.path().join("player.txt");
    fs::write(&template_path, "{{ mode={}; width={} }}").unwrap();

    let config = ConversionConfig::default()
        .with_size(8, 4)
        .with_range(0, 2)
        .with_frame_rates(24, 24);
    let mut pipeline = ConversionPipeline::new(SolidVideo::new(8, 4, 3, 0), config)
        .with_output(dir.path().join("out.txt"))
        .with_template(TemplateSource::File(template_path));

    let result = pipeline.run(|_| {}).unwrap();
    assert_eq!(result.asset, "{ mode=MODE_64BIT; width=64 }");
}

#[test]
fn test_decode_failure_leaves_directory_clean() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.h");
    let config = ConversionConfig::default()
        .with_size(16, 8)
        .with_range(0, 9)
        .with_frame_rates(30, 30);
    let video = SyntheticVideo::new(32, 16, 10, 30).with_failure_at(6);
    let mut pipeline = ConversionPipeline::new(video, config).with_output(&output);

    let events = std::cell::RefCell::new(Vec::new());
    let err = pipeline.run(|e| events.borrow_mut().push(e)).unwrap_err();

    assert!(matches!(err, ConvertError::FrameDecode { index: 6, .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    let events = events.into_inner();
    assert_eq!(events.len(), 7);
    match events.last() {
        Some(PipelineEvent::Failed { message }) => {
            assert!(message.starts_with("failed to decode frame 6"))
        }
        other => panic!("unexpected final event {:?}", other),
    }
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_crop_larger_than_source_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConversionConfig::default()
        .with_size(16, 8)
        .with_range(0, 1)
        .with_frame_rates(30, 30)
        .with_crop(CropRect {
            top: 10,
            bottom: 10,
            left: 0,
            right: 0,
        });
    let mut pipeline = ConversionPipeline::new(SyntheticVideo::new(32, 16, 10, 30), config)
        .with_output(dir.path().join("out.h"));

    assert!(matches!(
        pipeline.run(|_| {}),
        Err(ConvertError::InvalidDimensions { .. })
    ));
    assert!(pipeline.video().decoded().is_empty());
}

#[test]
fn test_spawned_run_can_be_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.h");
    let config = ConversionConfig::default()
        .with_size(16, 8)
        .with_range(0, 9)
        .with_frame_rates(30, 30);
    let pipeline =
        ConversionPipeline::new(SyntheticVideo::new(32, 16, 10, 30), config).with_output(&output);
    pipeline.cancel_token().cancel();

    let handle = spawn(pipeline);
    let events: Vec<PipelineEvent> = handle.events().iter().collect();
    let err = handle.join().unwrap_err();

    assert!(matches!(err, ConvertError::Cancelled { frames_packed: 0 }));
    assert_eq!(events, vec![PipelineEvent::Cancelled { frames_packed: 0 }]);
    assert!(!output.exists());
}
