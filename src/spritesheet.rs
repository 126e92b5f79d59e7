use std::path::Path;

use image::RgbaImage;
use image::imageops;

use crate::error::{AppError, Result};
use crate::frame::FrameSequence;

/// A horizontal strip of equally sized frames.
#[derive(Debug, Clone)]
pub struct Spritesheet {
    pub image: RgbaImage,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Source frame index for each column, left to right.
    pub indices: Vec<u32>,
}

impl Spritesheet {
    pub fn frame_count(&self) -> usize {
        self.indices.len()
    }

    /// X offset of each column.
    pub fn offsets(&self) -> Vec<u32> {
        (0..self.indices.len() as u32)
            .map(|column| column * self.frame_width)
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.image.save(path)?;
        Ok(())
    }
}

/// Pastes every frame left to right in index order with no padding.
/// All frames must share the first frame's dimensions.
pub fn assemble(frames: &FrameSequence) -> Result<Spritesheet> {
    let (frame_width, frame_height) = frames
        .iter()
        .next()
        .map(|(_, image)| image.dimensions())
        .ok_or_else(|| AppError::EmptyStageInput {
            stage: "spritesheet".to_string(),
        })?;

    for (index, image) in frames.iter() {
        let (found_width, found_height) = image.dimensions();
        if (found_width, found_height) != (frame_width, frame_height) {
            return Err(AppError::DimensionMismatch {
                index,
                expected_width: frame_width,
                expected_height: frame_height,
                found_width,
                found_height,
            });
        }
    }

    let sheet_width = frame_width
        .checked_mul(frames.len() as u32)
        .ok_or_else(|| AppError::InvalidConfig("spritesheet width overflows u32".to_string()))?;

    // RgbaImage::new is fully transparent.
    let mut canvas = RgbaImage::new(sheet_width, frame_height);
    let mut indices = Vec::with_capacity(frames.len());
    for (column, (index, image)) in frames.iter().enumerate() {
        let x = i64::from(column as u32 * frame_width);
        imageops::replace(&mut canvas, image, x, 0);
        indices.push(index);
    }

    Ok(Spritesheet {
        image: canvas,
        frame_width,
        frame_height,
        indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use image::Rgba;

    fn solid(index: u32, width: u32, height: u32) -> Frame {
        Frame {
            index,
            image: RgbaImage::from_pixel(width, height, Rgba([index as u8, 10, 20, 255])),
        }
    }

    #[test]
    fn width_is_frame_width_times_count() {
        let frames: FrameSequence = (0..5).map(|index| solid(index, 16, 12)).collect();
        let sheet = assemble(&frames).expect("assemble");

        assert_eq!(sheet.image.dimensions(), (80, 12));
        assert_eq!(sheet.frame_count(), 5);
        assert_eq!(sheet.offsets(), vec![0, 16, 32, 48, 64]);
    }

    #[test]
    fn frames_land_in_index_order() {
        let frames: FrameSequence = [4_u32, 1, 9].into_iter().map(|i| solid(i, 3, 3)).collect();
        let sheet = assemble(&frames).expect("assemble");

        assert_eq!(sheet.indices, vec![1, 4, 9]);
        assert_eq!(sheet.image.get_pixel(0, 0)[0], 1);
        assert_eq!(sheet.image.get_pixel(3, 2)[0], 4);
        assert_eq!(sheet.image.get_pixel(8, 1)[0], 9);
    }

    #[test]
    fn transparency_is_copied_not_blended() {
        let mut frame = solid(0, 2, 2);
        frame.image.put_pixel(1, 1, Rgba([50, 60, 70, 0]));
        let frames: FrameSequence = [frame].into_iter().collect();

        let sheet = assemble(&frames).expect("assemble");
        assert_eq!(sheet.image.get_pixel(1, 1), &Rgba([50, 60, 70, 0]));
    }

    #[test]
    fn mismatched_frame_is_named() {
        let frames: FrameSequence = vec![solid(0, 8, 8), solid(1, 8, 8), solid(2, 8, 7)]
            .into_iter()
            .collect();

        let err = assemble(&frames).unwrap_err();
        assert!(matches!(
            err,
            AppError::DimensionMismatch {
                index: 2,
                found_height: 7,
                ..
            }
        ));
    }

    #[test]
    fn empty_sequence_is_rejected() {
        let err = assemble(&FrameSequence::new()).unwrap_err();
        assert!(matches!(err, AppError::EmptyStageInput { .. }));
    }
}
