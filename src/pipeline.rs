use std::fs;
use std::path::{Component, Path, PathBuf};

use clap::ValueEnum;
use tracing::{info, warn};

use crate::animation;
use crate::background::{self, ForegroundExtractor, Quality, Rembg};
use crate::error::{AppError, Result};
use crate::frame::{self, FrameSequence};
use crate::pixelate;
use crate::quantize;
use crate::spritesheet;
use crate::stage::{Stage, StageReport};
use crate::video::{AnimationEncoder, Ffmpeg, FrameDecoder};

pub const DEFAULT_OUTPUT_DIR: &str = "pipeline_output";
pub const DEFAULT_RAW_DIR: &str = "01_raw_frames";
pub const DEFAULT_NO_BACKGROUND_DIR: &str = "02_no_bg_frames";
pub const DEFAULT_PIXELATED_DIR: &str = "03_pixelated_frames";
pub const DEFAULT_FINAL_DIR: &str = "04_final_frames";
pub const DEFAULT_SPRITESHEET_NAME: &str = "final_spritesheet.png";
pub const DEFAULT_GIF_NAME: &str = "final_animation.gif";
pub const DEFAULT_VIDEO_FPS: f64 = 25.0;
pub const DEFAULT_GIF_FPS: f64 = 10.0;
pub const DEFAULT_GIF_SKIP_RATIO: u32 = 1;
pub const DEFAULT_DOWNSCALE_FACTOR: f64 = 8.0;
pub const DEFAULT_COLORS: u32 = 16;

/// Pipeline steps in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum Step {
    Extract,
    RemoveBackground,
    Pixelate,
    Quantize,
    Assemble,
}

impl Step {
    pub const ALL: [Step; 5] = [
        Step::Extract,
        Step::RemoveBackground,
        Step::Pixelate,
        Step::Quantize,
        Step::Assemble,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::Extract => "extract",
            Step::RemoveBackground => "remove-background",
            Step::Pixelate => "pixelate",
            Step::Quantize => "quantize",
            Step::Assemble => "assemble",
        }
    }

    pub fn next(self) -> Option<Step> {
        match self {
            Step::Extract => Some(Step::RemoveBackground),
            Step::RemoveBackground => Some(Step::Pixelate),
            Step::Pixelate => Some(Step::Quantize),
            Step::Quantize => Some(Step::Assemble),
            Step::Assemble => None,
        }
    }

    pub fn previous(self) -> Option<Step> {
        Step::ALL.into_iter().find(|step| step.next() == Some(self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDirs {
    pub raw: String,
    pub no_background: String,
    pub pixelated: String,
    pub quantized: String,
}

impl Default for StageDirs {
    fn default() -> Self {
        Self {
            raw: DEFAULT_RAW_DIR.to_string(),
            no_background: DEFAULT_NO_BACKGROUND_DIR.to_string(),
            pixelated: DEFAULT_PIXELATED_DIR.to_string(),
            quantized: DEFAULT_FINAL_DIR.to_string(),
        }
    }
}

impl StageDirs {
    /// Directory a step writes its frames to. `Assemble` writes none.
    pub fn for_step(&self, step: Step) -> Option<&str> {
        match step {
            Step::Extract => Some(self.raw.as_str()),
            Step::RemoveBackground => Some(self.no_background.as_str()),
            Step::Pixelate => Some(self.pixelated.as_str()),
            Step::Quantize => Some(self.quantized.as_str()),
            Step::Assemble => None,
        }
    }

    fn all(&self) -> [&str; 4] {
        [
            self.raw.as_str(),
            self.no_background.as_str(),
            self.pixelated.as_str(),
            self.quantized.as_str(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub stage_dirs: StageDirs,
    pub spritesheet_name: String,
    pub gif_name: String,
    pub video_fps: f64,
    pub gif_fps: f64,
    pub gif_skip_ratio: u32,
    pub downscale_factor: f64,
    pub colors: u32,
    pub quality: Quality,
    pub resume_from: Option<Step>,
    pub parallel: bool,
}

impl PipelineConfig {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            stage_dirs: StageDirs::default(),
            spritesheet_name: DEFAULT_SPRITESHEET_NAME.to_string(),
            gif_name: DEFAULT_GIF_NAME.to_string(),
            video_fps: DEFAULT_VIDEO_FPS,
            gif_fps: DEFAULT_GIF_FPS,
            gif_skip_ratio: DEFAULT_GIF_SKIP_RATIO,
            downscale_factor: DEFAULT_DOWNSCALE_FACTOR,
            colors: DEFAULT_COLORS,
            quality: Quality::default(),
            resume_from: None,
            parallel: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.video_fps.is_finite() || self.video_fps <= 0.0 {
            return Err(invalid(format!("video fps must be positive, got {}", self.video_fps)));
        }
        if !self.gif_fps.is_finite() || self.gif_fps <= 0.0 {
            return Err(invalid(format!("gif fps must be positive, got {}", self.gif_fps)));
        }
        if self.gif_skip_ratio == 0 {
            return Err(invalid("gif skip ratio must be at least 1"));
        }
        if !self.downscale_factor.is_finite() || self.downscale_factor < 1.0 {
            return Err(invalid(format!(
                "downscale factor must be at least 1, got {}",
                self.downscale_factor
            )));
        }
        if !(2..=256).contains(&self.colors) {
            return Err(invalid(format!(
                "color count must be between 2 and 256, got {}",
                self.colors
            )));
        }

        // Everything below is joined onto output_dir and later deleted, so
        // each name must stay directly inside it.
        let dirs = self.stage_dirs.all();
        for dir in dirs {
            check_plain_name("stage directory", dir)?;
        }
        check_plain_name("spritesheet name", &self.spritesheet_name)?;
        check_plain_name("gif name", &self.gif_name)?;

        let names = [
            dirs[0],
            dirs[1],
            dirs[2],
            dirs[3],
            self.spritesheet_name.as_str(),
            self.gif_name.as_str(),
        ];
        for (position, name) in names.iter().enumerate() {
            if names[..position].contains(name) {
                return Err(invalid(format!("output name `{name}` is used twice")));
            }
        }

        Ok(())
    }

    pub fn step_dir(&self, step: Step) -> Option<PathBuf> {
        self.stage_dirs
            .for_step(step)
            .map(|name| self.output_dir.join(name))
    }

    pub fn spritesheet_path(&self) -> PathBuf {
        self.output_dir.join(&self.spritesheet_name)
    }

    pub fn gif_path(&self) -> PathBuf {
        self.output_dir.join(&self.gif_name)
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::InvalidConfig(message.into())
}

/// Accepts exactly one normal path component: no separators, `.`, `..`,
/// roots or prefixes.
fn check_plain_name(what: &str, name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.trim().is_empty() => Ok(()),
        _ => Err(invalid(format!(
            "{what} `{name}` must be a plain name inside the output directory"
        ))),
    }
}

/// Where the driver currently is. `Failed` and `Done` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running(Step),
    Done,
    Failed(Step),
}

#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub frames_extracted: usize,
    pub skipped: Vec<(Step, Vec<u32>)>,
    pub final_frame_count: usize,
    pub frame_width: u32,
    pub frame_height: u32,
    pub spritesheet: PathBuf,
    pub spritesheet_width: u32,
    pub spritesheet_height: u32,
    pub gif: Option<PathBuf>,
    pub gif_frames: usize,
    pub gif_error: Option<String>,
}

impl PipelineStats {
    /// Frames dropped while `step` was producing or loading its input.
    pub fn skipped_at(&self, step: Step) -> &[u32] {
        self.skipped
            .iter()
            .find(|(recorded, _)| *recorded == step)
            .map(|(_, indices)| indices.as_slice())
            .unwrap_or(&[])
    }

    fn note_skipped(&mut self, step: Step, indices: Vec<u32>) {
        if indices.is_empty() {
            return;
        }
        warn!(step = step.name(), skipped = ?indices, "frames dropped");
        match self.skipped.iter_mut().find(|(recorded, _)| *recorded == step) {
            Some((_, existing)) => {
                existing.extend(indices);
                existing.sort_unstable();
            }
            None => self.skipped.push((step, indices)),
        }
    }
}

/// Runs the pipeline with ffmpeg and rembg as collaborators.
pub fn run(config: &PipelineConfig) -> Result<PipelineStats> {
    let ffmpeg = Ffmpeg;
    let rembg = Rembg::new(config.quality);
    Pipeline::new(config, &ffmpeg, &rembg, &ffmpeg).run()
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    decoder: &'a dyn FrameDecoder,
    extractor: &'a dyn ForegroundExtractor,
    encoder: &'a dyn AnimationEncoder,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        decoder: &'a dyn FrameDecoder,
        extractor: &'a dyn ForegroundExtractor,
        encoder: &'a dyn AnimationEncoder,
    ) -> Self {
        Self {
            config,
            decoder,
            extractor,
            encoder,
            state: PipelineState::Running(config.resume_from.unwrap_or(Step::Extract)),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run(&mut self) -> Result<PipelineStats> {
        self.config.validate()?;

        let start = match self.state {
            PipelineState::Running(step) => step,
            PipelineState::Done | PipelineState::Failed(_) => {
                return Err(invalid("pipeline has already finished"));
            }
        };

        let mut stats = PipelineStats::default();
        let mut frames = match self.prepare(start, &mut stats) {
            Ok(frames) => frames,
            Err(err) => {
                self.state = PipelineState::Failed(start);
                return Err(err.at_stage(start.name(), 0));
            }
        };

        while let PipelineState::Running(step) = self.state {
            let carried = frames.len();
            info!(step = step.name(), frames = carried, "entering step");
            match self.execute(step, frames, &mut stats) {
                Ok(next) => {
                    frames = next;
                    self.state = step.next().map_or(PipelineState::Done, PipelineState::Running);
                }
                Err(err) => {
                    self.state = PipelineState::Failed(step);
                    return Err(err.at_stage(step.name(), carried));
                }
            }
        }

        Ok(stats)
    }

    /// Clears directories the run is about to produce and, when resuming,
    /// loads the previous step's frames from disk. Nothing is deleted until
    /// the resume input is known to exist.
    fn prepare(&self, start: Step, stats: &mut PipelineStats) -> Result<FrameSequence> {
        let config = self.config;

        if start == Step::Extract {
            if !config.input.exists() {
                return Err(AppError::InputNotFound(config.input.clone()));
            }
            if !self.decoder.available() {
                return Err(AppError::MissingFfmpeg);
            }
        }

        let resume_dir = start.previous().and_then(|previous| config.step_dir(previous));
        if let Some(dir) = &resume_dir {
            if !dir.is_dir() {
                return Err(AppError::EmptyStageInput {
                    stage: start.name().to_string(),
                });
            }
        }

        fs::create_dir_all(&config.output_dir)?;
        for step in Step::ALL.into_iter().filter(|step| *step >= start) {
            if let Some(dir) = config.step_dir(step) {
                remove_dir_if_exists(&dir)?;
            }
        }
        for artifact in [config.spritesheet_path(), config.gif_path()] {
            if artifact.is_file() {
                fs::remove_file(&artifact)?;
            }
        }

        let Some(dir) = resume_dir else {
            return Ok(FrameSequence::new());
        };

        let loaded = FrameSequence::load_dir(&dir)?;
        stats.note_skipped(start, loaded.unreadable);
        if loaded.frames.is_empty() {
            return Err(AppError::EmptyStageInput {
                stage: start.name().to_string(),
            });
        }

        info!(
            step = start.name(),
            frames = loaded.frames.len(),
            dir = %dir.display(),
            "resuming from saved frames"
        );
        Ok(loaded.frames)
    }

    fn execute(
        &self,
        step: Step,
        frames: FrameSequence,
        stats: &mut PipelineStats,
    ) -> Result<FrameSequence> {
        let config = self.config;
        match step {
            Step::Extract => self.extract(stats),
            Step::RemoveBackground => {
                self.extractor.prepare(&frames)?;
                let extractor = self.extractor;
                let report = self.stage(step).run(frames, |index, image| {
                    background::remove_background(extractor, index, image)
                })?;
                Ok(record(stats, step, report))
            }
            Step::Pixelate => {
                let factor = config.downscale_factor;
                let report = self
                    .stage(step)
                    .run(frames, |_, image| pixelate::pixelate(image, factor))?;
                Ok(record(stats, step, report))
            }
            Step::Quantize => {
                let colors = config.colors;
                let report = self
                    .stage(step)
                    .run(frames, |_, image| quantize::quantize(image, colors))?;
                Ok(record(stats, step, report))
            }
            Step::Assemble => {
                self.assemble(&frames, stats)?;
                Ok(frames)
            }
        }
    }

    fn extract(&self, stats: &mut PipelineStats) -> Result<FrameSequence> {
        let config = self.config;
        let dir = config
            .step_dir(Step::Extract)
            .ok_or_else(|| invalid("extract step has no directory"))?;
        frame::prepare_dir(&dir)?;

        let paths = self
            .decoder
            .extract_frames(&config.input, config.video_fps, &dir)?;
        let loaded = FrameSequence::load_files(&paths);
        stats.frames_extracted = loaded.frames.len() + loaded.unreadable.len();
        stats.note_skipped(Step::Extract, loaded.unreadable);

        if loaded.frames.is_empty() {
            return Err(AppError::NoFramesExtracted);
        }
        Ok(loaded.frames)
    }

    fn stage(&self, step: Step) -> Stage {
        let stage = Stage::new(step.name()).parallel(self.config.parallel);
        match self.config.step_dir(step) {
            Some(dir) => stage.with_output_dir(dir),
            None => stage,
        }
    }

    /// Spritesheet and GIF are built independently; only a spritesheet
    /// failure fails the run.
    fn assemble(&self, frames: &FrameSequence, stats: &mut PipelineStats) -> Result<()> {
        let config = self.config;
        let frames_dir = last_frames_dir(config, frames)?;

        let sheet = spritesheet::assemble(frames).and_then(|sheet| {
            let path = config.spritesheet_path();
            sheet.save(&path)?;
            Ok((sheet, path))
        });

        match animation::build_gif(
            self.encoder,
            frames,
            &frames_dir,
            config.gif_skip_ratio,
            config.gif_fps,
            &config.gif_path(),
        ) {
            Ok(summary) => {
                stats.gif_frames = summary.selected.len();
                stats.gif = Some(summary.path);
            }
            Err(err) => {
                warn!(error = %err, "gif creation failed, spritesheet is unaffected");
                stats.gif_error = Some(err.to_string());
            }
        }

        let (sheet, path) = sheet?;
        info!(
            frames = sheet.frame_count(),
            columns = sheet.frame_count(),
            frame_width = sheet.frame_width,
            frame_height = sheet.frame_height,
            output = %path.display(),
            "spritesheet saved"
        );

        stats.final_frame_count = sheet.frame_count();
        stats.frame_width = sheet.frame_width;
        stats.frame_height = sheet.frame_height;
        stats.spritesheet_width = sheet.image.width();
        stats.spritesheet_height = sheet.image.height();
        stats.spritesheet = path;
        Ok(())
    }
}

fn record(stats: &mut PipelineStats, step: Step, report: StageReport) -> FrameSequence {
    stats.note_skipped(step, report.skipped);
    report.frames
}

/// The frames being assembled live in the quantize step's directory.
fn last_frames_dir(config: &PipelineConfig, frames: &FrameSequence) -> Result<PathBuf> {
    if frames.is_empty() {
        return Err(AppError::EmptyStageInput {
            stage: Step::Assemble.name().to_string(),
        });
    }
    config
        .step_dir(Step::Quantize)
        .ok_or_else(|| invalid("quantize step has no directory"))
}

fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_run_in_fixed_order() {
        let mut order = vec![Step::Extract];
        while let Some(next) = order.last().and_then(|step| step.next()) {
            order.push(next);
        }
        assert_eq!(order, Step::ALL.to_vec());
        assert_eq!(Step::Pixelate.previous(), Some(Step::RemoveBackground));
        assert_eq!(Step::Extract.previous(), None);
    }

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::new("target.mp4");
        config.validate().expect("defaults validate");
        assert_eq!(
            config.step_dir(Step::Quantize),
            Some(PathBuf::from("pipeline_output/04_final_frames"))
        );
        assert_eq!(config.step_dir(Step::Assemble), None);
        assert_eq!(
            config.spritesheet_path(),
            PathBuf::from("pipeline_output/final_spritesheet.png")
        );
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let base = PipelineConfig::new("in.mp4");

        let mut config = base.clone();
        config.gif_skip_ratio = 0;
        assert!(matches!(config.validate(), Err(AppError::InvalidConfig(_))));

        let mut config = base.clone();
        config.downscale_factor = 0.5;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.colors = 300;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.video_fps = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = base;
        config.stage_dirs.pixelated = config.stage_dirs.raw.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn names_must_stay_inside_output_dir() {
        let base = PipelineConfig::new("in.mp4");
        for name in ["..", ".", "/abs", "a/b", "", "  "] {
            let mut config = base.clone();
            config.stage_dirs.raw = name.to_string();
            assert!(
                matches!(config.validate(), Err(AppError::InvalidConfig(_))),
                "stage dir {name:?}"
            );

            let mut config = base.clone();
            config.spritesheet_name = name.to_string();
            assert!(config.validate().is_err(), "spritesheet {name:?}");

            let mut config = base.clone();
            config.gif_name = name.to_string();
            assert!(config.validate().is_err(), "gif {name:?}");
        }

        let mut config = base.clone();
        config.stage_dirs.quantized = "05_final".to_string();
        config.validate().expect("plain names are fine");
    }

    #[test]
    fn artifacts_need_distinct_names() {
        let mut config = PipelineConfig::new("in.mp4");
        config.gif_name = config.spritesheet_name.clone();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::new("in.mp4");
        config.gif_name = config.stage_dirs.raw.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn skipped_indices_merge_per_step() {
        let mut stats = PipelineStats::default();
        stats.note_skipped(Step::Pixelate, vec![7]);
        stats.note_skipped(Step::Pixelate, vec![]);
        stats.note_skipped(Step::Pixelate, vec![2]);
        stats.note_skipped(Step::Quantize, vec![]);

        assert_eq!(stats.skipped_at(Step::Pixelate), &[2, 7]);
        assert!(stats.skipped_at(Step::Quantize).is_empty());
        assert_eq!(stats.skipped.len(), 1);
    }
}
