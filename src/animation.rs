use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::frame::{self, FrameSequence};
use crate::video::AnimationEncoder;

/// Keeps every `skip_ratio`-th entry, always starting with the first.
/// Selection is positional, so gaps in the indices are tolerated.
pub fn select_frames(indices: &[u32], skip_ratio: u32) -> Vec<u32> {
    indices
        .iter()
        .step_by(skip_ratio.max(1) as usize)
        .copied()
        .collect()
}

#[derive(Debug, Clone)]
pub struct GifSummary {
    pub path: PathBuf,
    pub selected: Vec<u32>,
}

/// Encodes the selected frames from `frames_dir` into a looping GIF.
/// The frames on disk are only read, never rewritten.
pub fn build_gif(
    encoder: &dyn AnimationEncoder,
    frames: &FrameSequence,
    frames_dir: &Path,
    skip_ratio: u32,
    fps: f64,
    output: &Path,
) -> Result<GifSummary> {
    let selected = select_frames(&frames.indices(), skip_ratio);
    let paths: Vec<PathBuf> = selected
        .iter()
        .map(|index| frame::frame_path(frames_dir, *index))
        .collect();

    info!(
        available = frames.len(),
        selected = selected.len(),
        skip_ratio,
        fps,
        "encoding gif"
    );
    encoder.encode_gif(&paths, fps, output)?;

    Ok(GifSummary {
        path: output.to_path_buf(),
        selected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use image::RgbaImage;

    use crate::frame::Frame;

    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(Vec<PathBuf>, f64, PathBuf)>>,
    }

    impl AnimationEncoder for Recorder {
        fn encode_gif(&self, frames: &[PathBuf], fps: f64, output: &Path) -> Result<()> {
            self.calls
                .borrow_mut()
                .push((frames.to_vec(), fps, output.to_path_buf()));
            Ok(())
        }
    }

    #[test]
    fn selects_every_rth_frame() {
        let indices: Vec<u32> = (0..10).collect();
        assert_eq!(select_frames(&indices, 2), vec![0, 2, 4, 6, 8]);
        assert_eq!(select_frames(&indices, 3), vec![0, 3, 6, 9]);
        assert_eq!(select_frames(&indices, 1), indices);
    }

    #[test]
    fn selection_size_is_ceiling() {
        for count in 1..20_u32 {
            let indices: Vec<u32> = (0..count).collect();
            for ratio in 1..6_u32 {
                let expected = count.div_ceil(ratio) as usize;
                assert_eq!(select_frames(&indices, ratio).len(), expected);
            }
        }
    }

    #[test]
    fn zero_ratio_behaves_like_one() {
        assert_eq!(select_frames(&[0, 1, 2], 0), vec![0, 1, 2]);
    }

    #[test]
    fn passes_selected_paths_in_order() {
        let frames: FrameSequence = [0_u32, 1, 3, 4]
            .into_iter()
            .map(|index| Frame {
                index,
                image: RgbaImage::new(1, 1),
            })
            .collect();
        let recorder = Recorder::default();
        let dir = Path::new("final");

        let summary = build_gif(&recorder, &frames, dir, 2, 10.0, Path::new("out.gif"))
            .expect("build gif");

        assert_eq!(summary.selected, vec![0, 3]);
        let calls = recorder.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].0,
            vec![dir.join("frame_0000.png"), dir.join("frame_0003.png")]
        );
        assert_eq!(calls[0].1, 10.0);
    }
}
