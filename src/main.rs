use anyhow::{anyhow, bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, FuzzySelect, Input};
use indicatif::{ProgressBar, ProgressStyle};
use picomovie::preprocessing::{resolve_preprocess_filter, PREPROCESS_PRESETS};
use picomovie::preview::{render_ascii, save_image};
use picomovie::{
    spawn, AppConfig, ConversionConfig, ConversionPipeline, CropRect, MovieConverter,
    PipelineEvent, TemplateSource, VideoSource,
};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        return AppConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()));
    }

    // Look for picomovie.{json,toml} in app data, current dir fallback, then built-in default
    let mut tried: Vec<PathBuf> = Vec::new();
    if let Some(d) = dirs::data_dir() {
        let d = d.join("picomovie");
        tried.push(d.join("picomovie.json"));
        tried.push(d.join("picomovie.toml"));
    }
    tried.push(PathBuf::from("picomovie.json"));
    tried.push(PathBuf::from("picomovie.toml"));

    for p in &tried {
        if p.exists() {
            debug!("using config {}", p.display());
            return AppConfig::from_file(p)
                .with_context(|| format!("loading config {}", p.display()));
        }
    }

    Ok(AppConfig::default())
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "picomovie=debug" } else { "picomovie=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Options shared by conversion and preview.
#[derive(ClapArgs, Debug, Clone, Default)]
struct FrameArgs {
    /// Output width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Output height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Luminance threshold (0-255); brighter pixels are lit
    #[arg(long)]
    threshold: Option<u8>,

    /// Light pixels at or below the threshold instead
    #[arg(long, default_value_t = false)]
    invert: bool,

    /// Custom ffmpeg -vf filter chain applied before thresholding
    #[arg(long, conflicts_with = "preprocess_preset")]
    preprocess: Option<String>,

    /// Named preprocessing preset (see `picomovie presets`)
    #[arg(long)]
    preprocess_preset: Option<String>,

    /// Crop equally from all sides of the source (overridden by directional crops)
    #[arg(long)]
    crop: Option<u32>,

    /// Crop pixels from the top of the source
    #[arg(long)]
    crop_top: Option<u32>,

    /// Crop pixels from the bottom of the source
    #[arg(long)]
    crop_bottom: Option<u32>,

    /// Crop pixels from the left of the source
    #[arg(long)]
    crop_left: Option<u32>,

    /// Crop pixels from the right of the source
    #[arg(long)]
    crop_right: Option<u32>,
}

impl FrameArgs {
    fn crop_rect(&self) -> CropRect {
        let base = self.crop.unwrap_or(0);
        CropRect {
            top: self.crop_top.unwrap_or(base),
            bottom: self.crop_bottom.unwrap_or(base),
            left: self.crop_left.unwrap_or(base),
            right: self.crop_right.unwrap_or(base),
        }
    }

    fn preprocess_filter(&self) -> Result<Option<String>> {
        Ok(resolve_preprocess_filter(
            self.preprocess.as_deref(),
            self.preprocess_preset.as_deref(),
        )?)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print frame count, frame rate and size of a video
    Probe {
        /// Video file to inspect
        input: PathBuf,
    },
    /// Binarize one frame and print it
    Preview {
        /// Video file to read
        input: PathBuf,

        /// Frame index to preview
        #[arg(long, default_value_t = 0)]
        frame: u64,

        /// Also save the frame as a PNG
        #[arg(long)]
        png: Option<PathBuf>,

        /// Pixels per cell in the saved PNG
        #[arg(long, default_value_t = 4)]
        scale: u32,

        #[command(flatten)]
        frame_args: FrameArgs,
    },
    /// List the preprocessing and size presets
    Presets,
}

#[derive(Parser, Debug)]
#[command(version, about = "Convert videos into packed frame data for monochrome OLED displays.")]
struct Args {
    /// Optional subcommands
    #[command(subcommand)]
    cmd: Option<Command>,

    /// Input video file
    input: Option<PathBuf>,

    /// Output file or directory for the generated header
    out: Option<PathBuf>,

    #[command(flatten)]
    frame_args: FrameArgs,

    /// First source frame to include
    #[arg(long)]
    start: Option<u64>,

    /// Last source frame to include
    #[arg(long)]
    end: Option<u64>,

    /// Target frames per second (must divide the source rate)
    #[arg(long)]
    fps: Option<u32>,

    /// Override the source frame rate reported by the video
    #[arg(long)]
    source_fps: Option<u32>,

    /// Template file to fill instead of the built-in header
    #[arg(long)]
    template: Option<PathBuf>,

    /// Configuration file (JSON or TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use default size preset
    #[arg(long, default_value_t = false, conflicts_with_all = &["small", "wide"])]
    default: bool,

    /// Use the small size preset
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["default", "wide"])]
    small: bool,

    /// Use the wide size preset (full display width, rotated packing)
    #[arg(long, short, default_value_t = false, conflicts_with_all = &["default", "small"])]
    wide: bool,

    /// Print conversion details when done
    #[arg(long, default_value_t = false)]
    log_details: bool,

    /// Debug logging to stderr
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    init_logging(args.verbose);
    let is_interactive = !(args.default || args.small || args.wide);

    let cfg = load_config(args.config.as_deref())?;
    let converter = MovieConverter::with_config(cfg.clone())?;

    // Handle subcommands early
    match args.cmd.take() {
        Some(Command::Probe { input }) => return run_probe(&converter, &input),
        Some(Command::Preview { input, frame, png, scale, frame_args }) => {
            return run_preview(&converter, &input, frame, png.as_deref(), scale, &frame_args);
        }
        Some(Command::Presets) => {
            run_presets(&cfg);
            return Ok(());
        }
        None => {}
    }

    // --- Interactive Prompts ---
    if args.input.is_none() {
        if !is_interactive {
            bail!("Input file must be provided when using a preset.");
        }
        let files = find_media_files();
        if files.is_empty() {
            bail!("No video files found in current directory.");
        }
        let selection = FuzzySelect::with_theme(&ColorfulTheme::default())
            .with_prompt("Choose an input video")
            .default(0)
            .items(&files)
            .interact()?;
        args.input = Some(PathBuf::from(&files[selection]));
    }

    let input_path = args
        .input
        .clone()
        .ok_or_else(|| anyhow!("Input file must be provided"))?;
    if !input_path.is_file() {
        bail!("Input path does not exist: {}", input_path.display());
    }

    let active_preset_name = if args.small {
        "small"
    } else if args.wide {
        "wide"
    } else {
        cfg.default_preset.as_str()
    };
    let active = *cfg
        .preset(active_preset_name)
        .ok_or_else(|| anyhow!("Missing preset '{}' in config", active_preset_name))?;

    let filter = args.frame_args.preprocess_filter()?;
    let video = converter.open_video(&input_path, filter.as_deref())?;
    let info = *video.info();
    let last = info
        .last_frame_index()
        .ok_or_else(|| anyhow!("{} contains no frames", input_path.display()))?;
    println!(
        "{}: {}x{}, {} frames at {} fps",
        input_path.display(),
        info.width,
        info.height,
        info.frame_count,
        info.frame_rate
    );

    if is_interactive {
        if args.frame_args.width.is_none() {
            args.frame_args.width = Some(
                Input::new()
                    .with_prompt("Width (pixels)")
                    .default(active.width)
                    .interact()?,
            );
        }
        if args.frame_args.height.is_none() {
            args.frame_args.height = Some(
                Input::new()
                    .with_prompt("Height (pixels)")
                    .default(active.height)
                    .interact()?,
            );
        }
        if args.frame_args.threshold.is_none() {
            args.frame_args.threshold = Some(
                Input::new()
                    .with_prompt("Luminance threshold")
                    .default(active.threshold)
                    .interact()?,
            );
        }
        if args.fps.is_none() {
            args.fps = Some(
                Input::new()
                    .with_prompt("Frames per second (FPS)")
                    .default(active.fps)
                    .interact()?,
            );
        }
        if args.start.is_none() {
            args.start = Some(
                Input::new()
                    .with_prompt("Start frame")
                    .default(0u64)
                    .interact()?,
            );
        }
        if args.end.is_none() {
            args.end = Some(
                Input::new()
                    .with_prompt("End frame")
                    .default(last)
                    .interact()?,
            );
        }
    }

    let width = args.frame_args.width.unwrap_or(active.width);
    let height = args.frame_args.height.unwrap_or(active.height);
    let threshold = args.frame_args.threshold.unwrap_or(active.threshold);
    let fps = args.fps.unwrap_or(active.fps);
    let source_fps = args.source_fps.unwrap_or(info.frame_rate);
    let start = args.start.unwrap_or(0);
    let end = args.end.unwrap_or(last);

    let config = ConversionConfig::default()
        .with_size(width, height)
        .with_threshold(threshold)
        .with_range(start, end)
        .with_frame_rates(source_fps, fps)
        .with_invert(args.frame_args.invert)
        .with_crop(args.frame_args.crop_rect())
        .with_filter(cfg.filter);

    // --- Execution ---
    let out = args.out.clone().unwrap_or_else(|| PathBuf::from("."));
    let output_path = converter.output_path(&out);

    if output_path.exists()
        && is_interactive
        && !Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", output_path.display()))
            .default(false)
            .interact()?
    {
        println!("Operation cancelled.");
        return Ok(());
    }

    let template = match &args.template {
        Some(path) => TemplateSource::File(path.clone()),
        None => TemplateSource::Builtin,
    };
    let pipeline = ConversionPipeline::new(video, config.clone())
        .with_profile(cfg.hardware)
        .with_template(template)
        .with_output(&output_path);

    // Fail fast on bad settings before starting the worker
    let total = pipeline.validate()?.len();

    let handle = spawn(pipeline);
    let token = handle.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        warn!("could not install Ctrl-C handler: {}", e);
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .context("progress bar template")?
            .progress_chars("#>-"),
    );
    for event in handle.events() {
        match event {
            PipelineEvent::Progress(p) => {
                pb.set_position(p.completed as u64);
                pb.set_message(p.message);
            }
            PipelineEvent::Completed { .. } => pb.finish_with_message("Done"),
            PipelineEvent::Failed { .. } => pb.abandon_with_message("Failed"),
            PipelineEvent::Cancelled { frames_packed } => {
                pb.abandon_with_message(format!("Cancelled after {} frames", frames_packed))
            }
        }
    }

    let result = handle.join()?;
    println!(
        "\nMovie data ({} frames, {}) written to {}",
        result.frame_count,
        result.mode.label(),
        result.output.display()
    );

    if args.log_details {
        println!("\n--- Generation Details ---");
        println!(
            "Version: {}\nFrames: {}\nSize: {}x{}\nThreshold: {}\nFPS: {} (source {})\nRange: {}..={}\nMode: {}",
            picomovie::VERSION,
            result.frame_count,
            width,
            height,
            threshold,
            fps,
            source_fps,
            start,
            end,
            result.mode.label()
        );
    }

    Ok(())
}

fn find_media_files() -> Vec<String> {
    WalkDir::new(".")
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file()
                && e.path().extension().is_some_and(|ext| {
                    matches!(
                        ext.to_str().map(str::to_ascii_lowercase).as_deref(),
                        Some("mp4" | "mkv" | "mov" | "avi" | "webm" | "gif")
                    )
                })
        })
        .filter_map(|e| e.path().to_str().map(str::to_string))
        .collect()
}

fn run_probe(converter: &MovieConverter, input: &Path) -> Result<()> {
    let video = converter.open_video(input, None)?;
    let info = video.info();
    println!("File:        {}", input.display());
    println!("Size:        {}x{}", info.width, info.height);
    println!("Frames:      {}", info.frame_count);
    println!("Frame rate:  {} ({:.3})", info.frame_rate, info.exact_frame_rate);
    match info.last_frame_index() {
        Some(last) => println!("Last frame:  {}", last),
        None => println!("Last frame:  none"),
    }
    Ok(())
}

fn run_preview(
    converter: &MovieConverter,
    input: &Path,
    frame: u64,
    png: Option<&Path>,
    scale: u32,
    frame_args: &FrameArgs,
) -> Result<()> {
    let cfg = converter.config();
    let preset = cfg
        .preset(&cfg.default_preset)
        .ok_or_else(|| anyhow!("Missing preset '{}' in config", cfg.default_preset))?;

    let filter = frame_args.preprocess_filter()?;
    let mut video = converter.open_video(input, filter.as_deref())?;
    let config = ConversionConfig::default()
        .with_size(
            frame_args.width.unwrap_or(preset.width),
            frame_args.height.unwrap_or(preset.height),
        )
        .with_threshold(frame_args.threshold.unwrap_or(preset.threshold))
        .with_invert(frame_args.invert)
        .with_crop(frame_args.crop_rect())
        .with_filter(cfg.filter);
    let crop = config.crop;
    if !crop.is_empty() {
        crop.region(video.info().width, video.info().height)?;
    }

    let raster = converter.preview_frame(&mut video, frame, &config)?;
    print!("{}", render_ascii(&raster));
    println!(
        "frame {}: {}x{}, {} of {} pixels lit",
        frame,
        raster.width(),
        raster.height(),
        raster.lit_count(),
        raster.width() * raster.height()
    );

    if let Some(path) = png {
        save_image(&raster, scale, path)
            .with_context(|| format!("saving preview {}", path.display()))?;
        println!("Preview saved to {}", path.display());
    }
    Ok(())
}

fn run_presets(cfg: &AppConfig) {
    println!("Preprocessing presets (--preprocess-preset):");
    for preset in PREPROCESS_PRESETS {
        println!("  {:<14} {}", preset.name, preset.description);
        println!("  {:<14} {}", "", preset.filter);
    }

    println!("\nSize presets:");
    let mut names: Vec<&String> = cfg.presets.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.presets[name];
        let marker = if *name == cfg.default_preset { " (default)" } else { "" };
        println!(
            "  {:<14} {}x{}, threshold {}, {} fps{}",
            name, p.width, p.height, p.threshold, p.fps, marker
        );
    }
}
