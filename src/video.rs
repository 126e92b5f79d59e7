use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::frame::{self, FRAME_PATTERN};

/// Turns a video file into a numbered sequence of frame images.
pub trait FrameDecoder {
    fn available(&self) -> bool;

    /// Writes frames named per [`FRAME_PATTERN`], starting at index 0, and
    /// returns their paths in index order.
    fn extract_frames(&self, input: &Path, fps: f64, output_dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Turns an ordered list of frame images into a looping animation.
pub trait AnimationEncoder {
    fn encode_gif(&self, frames: &[PathBuf], fps: f64, output: &Path) -> Result<()>;
}

/// The system `ffmpeg` binary, used for both directions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ffmpeg;

impl FrameDecoder for Ffmpeg {
    fn available(&self) -> bool {
        tools_available()
    }

    fn extract_frames(&self, input: &Path, fps: f64, output_dir: &Path) -> Result<Vec<PathBuf>> {
        extract_frames(input, fps, output_dir)
    }
}

impl AnimationEncoder for Ffmpeg {
    fn encode_gif(&self, frames: &[PathBuf], fps: f64, output: &Path) -> Result<()> {
        encode_gif(frames, fps, output)
    }
}

pub fn tools_available() -> bool {
    command_success("ffmpeg", &["-version"])
}

pub fn extract_frames(input: &Path, fps: f64, output_dir: &Path) -> Result<Vec<PathBuf>> {
    if !input.exists() {
        return Err(AppError::InputNotFound(input.to_path_buf()));
    }

    fs::create_dir_all(output_dir)?;
    let frame_pattern = output_dir.join(FRAME_PATTERN);

    let mut command = Command::new("ffmpeg");
    command
        .args(["-y", "-v", "error", "-i"])
        .arg(input)
        .arg("-vf")
        .arg(format!("fps={fps}"))
        .args(["-start_number", "0"])
        .arg(&frame_pattern);
    let output = run_command("ffmpeg", &mut command)?;
    ensure_command_success("ffmpeg", &output)?;

    let files: Vec<PathBuf> = frame::list_frame_files(output_dir)?
        .into_iter()
        .map(|(_, path)| path)
        .collect();

    if files.is_empty() {
        return Err(AppError::NoFramesExtracted);
    }

    info!(frames = files.len(), dir = %output_dir.display(), "video decoded");
    Ok(files)
}

/// Two-pass GIF encode: generate a palette with a reserved transparent entry,
/// then map the frames onto it.
pub fn encode_gif(frames: &[PathBuf], fps: f64, output: &Path) -> Result<()> {
    if frames.is_empty() {
        return Err(AppError::EmptyStageInput {
            stage: "gif".to_string(),
        });
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    // ffmpeg's image2 demuxer wants a contiguous numbered sequence.
    let staging = TempDir::new()?;
    for (position, source) in frames.iter().enumerate() {
        fs::copy(source, frame::frame_path(staging.path(), position as u32))?;
    }

    let frame_pattern = staging.path().join(FRAME_PATTERN);
    let palette = staging.path().join("palette.png");
    let fps_string = format!("{fps:.6}");

    let mut palette_cmd = Command::new("ffmpeg");
    palette_cmd
        .args(["-y", "-v", "error", "-framerate"])
        .arg(&fps_string)
        .args(["-start_number", "0", "-i"])
        .arg(&frame_pattern)
        .args(["-vf", "palettegen=reserve_transparent=1"])
        .arg(&palette);
    let palette_output = run_command("ffmpeg", &mut palette_cmd)?;
    ensure_command_success("ffmpeg", &palette_output)?;

    let mut gif_cmd = Command::new("ffmpeg");
    gif_cmd
        .args(["-y", "-v", "error", "-framerate"])
        .arg(&fps_string)
        .args(["-start_number", "0", "-i"])
        .arg(&frame_pattern)
        .arg("-i")
        .arg(&palette)
        .args([
            "-lavfi",
            "[0:v][1:v]paletteuse=alpha_threshold=128",
            "-loop",
            "0",
        ])
        .arg(output);
    let gif_output = run_command("ffmpeg", &mut gif_cmd)?;
    ensure_command_success("ffmpeg", &gif_output)?;

    info!(frames = frames.len(), output = %output.display(), "gif encoded");
    Ok(())
}

pub fn create_test_video(
    output: &Path,
    width: u32,
    height: u32,
    fps: u32,
    duration_seconds: f32,
) -> Result<()> {
    let size = format!("{width}x{height}");
    let rate = fps.to_string();
    let duration = format!("{duration_seconds}");

    let mut command = Command::new("ffmpeg");
    command
        .args(["-y", "-v", "error", "-f", "lavfi", "-i"])
        .arg(format!(
            "testsrc=size={size}:rate={rate}:duration={duration}"
        ))
        .arg(output);
    let output_cmd = run_command("ffmpeg", &mut command)?;

    ensure_command_success("ffmpeg", &output_cmd)
}

pub(crate) fn run_command(program: &str, command: &mut Command) -> Result<Output> {
    debug!(command = ?command, "running external command");
    command.output().map_err(|source| AppError::CommandSpawn {
        program: program.to_string(),
        source,
    })
}

pub(crate) fn ensure_command_success(program: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(AppError::CommandFailed {
        program: program.to_string(),
        code: output.status.code(),
        stderr,
    })
}

pub(crate) fn command_success(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
