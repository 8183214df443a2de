//! Example: Convert a video to OLED movie data using picomovie as a library
//!
//! Run with: cargo run --example convert_video -- path/to/video.mp4

use picomovie::preview::render_ascii;
use picomovie::{MovieConverter, VideoOptions, VideoSource};
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let input = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/video/input/test.mkv".to_string());
    let input = Path::new(&input);
    if !input.exists() {
        println!("Note: {} not found, nothing to convert", input.display());
        return Ok(());
    }

    let converter = MovieConverter::new();

    // Probe the video and derive a run from the "small" preset
    let mut video = converter.open_video(input, None)?;
    println!(
        "{}: {}x{}, {} frames at {} fps",
        input.display(),
        video.info().width,
        video.info().height,
        video.frame_count(),
        video.frame_rate()
    );
    let config = converter
        .conversion_config("small", video.info())?
        .with_frame_rates(video.frame_rate(), video.frame_rate());

    // Check the threshold on the first frame before converting everything
    let raster = converter.preview_frame(&mut video, 0, &config)?;
    println!("{}", render_ascii(&raster));

    let result = converter.convert_video_with_progress(
        video,
        Path::new("example_movie_data.h"),
        &config,
        &VideoOptions::default(),
        |progress| {
            if progress.completed % 50 == 0 || progress.completed == progress.total {
                println!("{:.1}% {}", progress.percentage, progress.message);
            }
        },
    )?;

    println!(
        "✓ {} frames ({}) written to {}",
        result.frame_count,
        result.mode.label(),
        result.output.display()
    );
    Ok(())
}
