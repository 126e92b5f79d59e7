use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, MutexGuard};

use image::RgbaImage;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::frame::{self, FrameSequence};
use crate::video::{command_success, ensure_command_success, run_command};

/// Which background removal model to run. Chosen once per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Quality {
    #[default]
    Fast,
    High,
}

/// Black-box foreground extraction: image in, same-sized image with alpha out.
pub trait ForegroundExtractor: Sync {
    /// Called once with the whole stage input before the first frame; load
    /// models, check tools or batch work here.
    fn prepare(&self, _frames: &FrameSequence) -> Result<()> {
        Ok(())
    }

    fn extract(&self, index: u32, image: &RgbaImage) -> Result<RgbaImage>;
}

/// Per-frame transform for the background removal stage.
pub fn remove_background(
    extractor: &dyn ForegroundExtractor,
    index: u32,
    image: &RgbaImage,
) -> Result<RgbaImage> {
    let output = extractor.extract(index, image)?;
    if output.dimensions() != image.dimensions() {
        return Err(AppError::ForegroundSize {
            width: image.width(),
            height: image.height(),
            found_width: output.width(),
            found_height: output.height(),
        });
    }
    Ok(output)
}

/// Shells out to the `rembg` command-line tool.
///
/// `prepare` runs `rembg p` once over every frame so the model loads a single
/// time. A frame the batch did not produce is retried on its own with
/// `rembg i`, so one bad frame still only costs that frame.
#[derive(Debug, Default)]
pub struct Rembg {
    quality: Quality,
    batch: Mutex<Option<TempDir>>,
}

impl Rembg {
    pub fn new(quality: Quality) -> Self {
        Self {
            quality,
            batch: Mutex::default(),
        }
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn available() -> bool {
        command_success("rembg", &["--help"])
    }

    fn model_args(&self) -> &'static [&'static str] {
        match self.quality {
            Quality::Fast => &["-m", "u2net"],
            Quality::High => &["-m", "isnet-general-use", "-a"],
        }
    }

    fn batch(&self) -> MutexGuard<'_, Option<TempDir>> {
        self.batch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn batch_output(&self, index: u32) -> Option<PathBuf> {
        let batch = self.batch();
        let path = frame::frame_path(&batch.as_ref()?.path().join("out"), index);
        path.exists().then_some(path)
    }

    fn run_batch(&self, frames: &FrameSequence) -> Result<TempDir> {
        let scratch = TempDir::new()?;
        let input_dir = scratch.path().join("in");
        let output_dir = scratch.path().join("out");
        fs::create_dir_all(&input_dir)?;
        fs::create_dir_all(&output_dir)?;
        for (index, image) in frames.iter() {
            frame::save_frame(&input_dir, index, image)?;
        }

        let mut command = Command::new("rembg");
        command
            .arg("p")
            .args(self.model_args())
            .arg(&input_dir)
            .arg(&output_dir);
        let result = run_command("rembg", &mut command);

        // Whatever the batch managed to write is still used.
        match result.and_then(|output| ensure_command_success("rembg", &output)) {
            Ok(()) => info!(frames = frames.len(), "rembg batch complete"),
            Err(err) => warn!(error = %err, "rembg batch failed, remaining frames run singly"),
        }
        Ok(scratch)
    }

    fn extract_single(&self, image: &RgbaImage) -> Result<RgbaImage> {
        let scratch = TempDir::new()?;
        let input = scratch.path().join("input.png");
        let output = scratch.path().join("output.png");
        image.save(&input)?;

        let mut command = Command::new("rembg");
        command
            .arg("i")
            .args(self.model_args())
            .arg(&input)
            .arg(&output);
        let result = run_command("rembg", &mut command)?;
        ensure_command_success("rembg", &result)?;

        read_rgba(&output)
    }
}

fn read_rgba(path: &Path) -> Result<RgbaImage> {
    Ok(image::open(path)?.to_rgba8())
}

impl ForegroundExtractor for Rembg {
    fn prepare(&self, frames: &FrameSequence) -> Result<()> {
        if !Self::available() {
            return Err(AppError::MissingRembg);
        }
        let scratch = self.run_batch(frames)?;
        *self.batch() = Some(scratch);
        Ok(())
    }

    fn extract(&self, index: u32, image: &RgbaImage) -> Result<RgbaImage> {
        if let Some(path) = self.batch_output(index) {
            match read_rgba(&path) {
                Ok(output) => return Ok(output),
                Err(err) => debug!(frame = index, error = %err, "batch output unreadable"),
            }
        }
        self.extract_single(image)
    }
}
