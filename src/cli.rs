use std::path::PathBuf;

use clap::Parser;
use tracing::Level;

use crate::background::Quality;
use crate::pipeline::{self, PipelineConfig, StageDirs, Step};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Convert a video into a pixel-art spritesheet and looping GIF"
)]
pub struct Cli {
    /// Input video path
    pub input: PathBuf,

    /// Base directory for stage frames and final artifacts
    #[arg(short, long, default_value = pipeline::DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Frames per second sampled from the video
    #[arg(long, default_value_t = pipeline::DEFAULT_VIDEO_FPS)]
    pub fps: f64,

    /// Playback rate of the GIF
    #[arg(long, default_value_t = pipeline::DEFAULT_GIF_FPS)]
    pub gif_fps: f64,

    /// Keep every Nth frame in the GIF (1 keeps all)
    #[arg(long, default_value_t = pipeline::DEFAULT_GIF_SKIP_RATIO)]
    pub skip: u32,

    /// Divide frame width and height by this before quantizing
    #[arg(long, default_value_t = pipeline::DEFAULT_DOWNSCALE_FACTOR)]
    pub downscale: f64,

    /// Maximum palette size per frame
    #[arg(long, default_value_t = pipeline::DEFAULT_COLORS)]
    pub colors: u32,

    /// Use the slower, higher-quality background removal model
    #[arg(long)]
    pub high_quality: bool,

    /// Start from a later step, reusing the previous step's frames on disk
    #[arg(long, value_enum)]
    pub resume_from: Option<Step>,

    /// Process frames within a stage on all cores
    #[arg(long)]
    pub parallel: bool,

    #[arg(long, default_value = pipeline::DEFAULT_SPRITESHEET_NAME)]
    pub spritesheet_name: String,

    #[arg(long, default_value = pipeline::DEFAULT_GIF_NAME)]
    pub gif_name: String,

    #[arg(long, default_value = pipeline::DEFAULT_RAW_DIR)]
    pub raw_dir: String,

    #[arg(long, default_value = pipeline::DEFAULT_NO_BACKGROUND_DIR)]
    pub no_bg_dir: String,

    #[arg(long, default_value = pipeline::DEFAULT_PIXELATED_DIR)]
    pub pixelated_dir: String,

    #[arg(long, default_value = pipeline::DEFAULT_FINAL_DIR)]
    pub final_dir: String,

    /// Log every frame and external command
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            input: self.input.clone(),
            output_dir: self.output_dir.clone(),
            stage_dirs: StageDirs {
                raw: self.raw_dir.clone(),
                no_background: self.no_bg_dir.clone(),
                pixelated: self.pixelated_dir.clone(),
                quantized: self.final_dir.clone(),
            },
            spritesheet_name: self.spritesheet_name.clone(),
            gif_name: self.gif_name.clone(),
            video_fps: self.fps,
            gif_fps: self.gif_fps,
            gif_skip_ratio: self.skip,
            downscale_factor: self.downscale,
            colors: self.colors,
            quality: if self.high_quality {
                Quality::High
            } else {
                Quality::Fast
            },
            resume_from: self.resume_from,
            parallel: self.parallel,
        }
    }

    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::WARN
        } else {
            Level::INFO
        }
    }
}
