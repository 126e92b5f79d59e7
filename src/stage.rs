use std::path::{Path, PathBuf};

use image::RgbaImage;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::frame::{self, Frame, FrameSequence};

/// Outcome of running one stage over a frame sequence.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: String,
    pub frames: FrameSequence,
    pub skipped: Vec<u32>,
}

impl StageReport {
    pub fn succeeded(&self) -> usize {
        self.frames.len()
    }

    pub fn attempted(&self) -> usize {
        self.frames.len() + self.skipped.len()
    }
}

/// Applies a per-frame transform to every frame, keeping the frame's index.
///
/// A frame whose transform fails is logged and dropped; the rest of the
/// sequence is still processed. Only a stage where every frame fails is an
/// error.
#[derive(Debug, Clone)]
pub struct Stage {
    name: String,
    output_dir: Option<PathBuf>,
    parallel: bool,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output_dir: None,
            parallel: false,
        }
    }

    /// Successful frames are written here as soon as they are produced.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip_all, fields(stage = %self.name))]
    pub fn run<F>(&self, input: FrameSequence, transform: F) -> Result<StageReport>
    where
        F: Fn(u32, &RgbaImage) -> Result<RgbaImage> + Sync,
    {
        if input.is_empty() {
            return Err(AppError::EmptyStageInput {
                stage: self.name.clone(),
            });
        }

        if let Some(dir) = &self.output_dir {
            frame::prepare_dir(dir)?;
        }

        let attempted = input.len();
        info!(frames = attempted, parallel = self.parallel, "stage started");

        let apply = |frame: Frame| -> (u32, Option<RgbaImage>) {
            let index = frame.index;
            match self.apply_one(&frame, &transform) {
                Ok(image) => (index, Some(image)),
                Err(err) => {
                    warn!(frame = index, error = %err, "frame failed, skipping");
                    (index, None)
                }
            }
        };

        // Indexed rayon iterators collect in input order, so both paths
        // produce results sorted by frame index.
        let results: Vec<(u32, Option<RgbaImage>)> = if self.parallel {
            let frames: Vec<Frame> = input.into_iter().collect();
            frames.into_par_iter().map(apply).collect()
        } else {
            input.into_iter().map(apply).collect()
        };

        let mut frames = FrameSequence::new();
        let mut skipped = Vec::new();
        for (index, image) in results {
            match image {
                Some(image) => {
                    frames.insert(index, image);
                }
                None => skipped.push(index),
            }
        }

        if frames.is_empty() {
            return Err(AppError::StageExhausted {
                stage: self.name.clone(),
                attempted,
            });
        }

        info!(
            succeeded = frames.len(),
            skipped = skipped.len(),
            "stage complete"
        );

        Ok(StageReport {
            name: self.name.clone(),
            frames,
            skipped,
        })
    }

    fn apply_one<F>(&self, frame: &Frame, transform: &F) -> Result<RgbaImage>
    where
        F: Fn(u32, &RgbaImage) -> Result<RgbaImage>,
    {
        debug!(frame = frame.index, "processing frame");
        let image = transform(frame.index, &frame.image)?;
        if let Some(dir) = &self.output_dir {
            write_frame(dir, frame.index, &image)?;
        }
        Ok(image)
    }
}

fn write_frame(dir: &Path, index: u32, image: &RgbaImage) -> Result<()> {
    frame::save_frame(dir, index, image).map(|_| ())
}
