use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use tracing::warn;

use crate::error::Result;

pub const FRAME_PREFIX: &str = "frame_";
pub const FRAME_EXTENSION: &str = "png";

/// `printf`-style pattern handed to ffmpeg; must agree with [`frame_file_name`].
pub const FRAME_PATTERN: &str = "frame_%04d.png";

#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u32,
    pub image: RgbaImage,
}

/// Frames keyed by their decode index. Iteration is always in index order.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    frames: BTreeMap<u32, RgbaImage>,
}

impl FrameSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: u32, image: RgbaImage) -> Option<RgbaImage> {
        self.frames.insert(index, image)
    }

    pub fn get(&self, index: u32) -> Option<&RgbaImage> {
        self.frames.get(&index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn indices(&self) -> Vec<u32> {
        self.frames.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &RgbaImage)> {
        self.frames.iter().map(|(index, image)| (*index, image))
    }

    /// Reads every `frame_NNNN.png` in `dir`, ordered by parsed index.
    /// Files that do not follow the naming scheme are ignored.
    pub fn load_dir(dir: &Path) -> Result<LoadedFrames> {
        Ok(load_indexed(list_frame_files(dir)?))
    }

    /// Reads the given frame files. Paths whose names carry no frame index
    /// are ignored.
    pub fn load_files(paths: &[PathBuf]) -> LoadedFrames {
        let files = paths
            .iter()
            .filter_map(|path| match parse_frame_index(path) {
                Some(index) => Some((index, path.clone())),
                None => {
                    warn!(path = %path.display(), "not a frame file, ignoring");
                    None
                }
            })
            .collect();
        load_indexed(files)
    }
}

/// Frames that decoded, plus the indices whose files could not be read.
#[derive(Debug, Clone, Default)]
pub struct LoadedFrames {
    pub frames: FrameSequence,
    pub unreadable: Vec<u32>,
}

fn load_indexed(mut files: Vec<(u32, PathBuf)>) -> LoadedFrames {
    files.sort_by_key(|(index, _)| *index);

    let mut loaded = LoadedFrames::default();
    for (index, path) in files {
        match image::open(&path) {
            Ok(image) => {
                loaded.frames.insert(index, image.to_rgba8());
            }
            Err(err) => {
                warn!(frame = index, path = %path.display(), error = %err, "unreadable frame, skipping");
                loaded.unreadable.push(index);
            }
        }
    }
    loaded
}

impl IntoIterator for FrameSequence {
    type Item = Frame;
    type IntoIter = std::iter::Map<
        std::collections::btree_map::IntoIter<u32, RgbaImage>,
        fn((u32, RgbaImage)) -> Frame,
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.frames
            .into_iter()
            .map(into_frame as fn((u32, RgbaImage)) -> Frame)
    }
}

fn into_frame((index, image): (u32, RgbaImage)) -> Frame {
    Frame { index, image }
}

impl FromIterator<Frame> for FrameSequence {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self {
            frames: iter
                .into_iter()
                .map(|frame| (frame.index, frame.image))
                .collect(),
        }
    }
}

pub fn frame_file_name(index: u32) -> String {
    format!("{FRAME_PREFIX}{index:04}.{FRAME_EXTENSION}")
}

pub fn frame_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(frame_file_name(index))
}

pub fn parse_frame_index(path: &Path) -> Option<u32> {
    if path.extension() != Some(OsStr::new(FRAME_EXTENSION)) {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(FRAME_PREFIX)?
        .parse()
        .ok()
}

/// Lists frame files in `dir` sorted numerically, not by directory order.
pub fn list_frame_files(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut files: Vec<(u32, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter_map(|path| parse_frame_index(&path).map(|index| (index, path)))
        .collect();
    files.sort_by_key(|(index, _)| *index);
    Ok(files)
}

pub fn save_frame(dir: &Path, index: u32, image: &RgbaImage) -> Result<PathBuf> {
    let path = frame_path(dir, index);
    if let Err(err) = image.save(&path) {
        let _ = fs::remove_file(&path);
        return Err(err.into());
    }
    Ok(path)
}

/// Removes any previous contents of `dir` and recreates it empty.
pub fn prepare_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        tracing::debug!(dir = %dir.display(), "clearing existing directory");
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}
