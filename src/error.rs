use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("input file does not exist: {0}")]
    InputNotFound(PathBuf),

    #[error("ffmpeg must be installed and available on PATH")]
    MissingFfmpeg,

    #[error("rembg must be installed and available on PATH for background removal")]
    MissingRembg,

    #[error("failed to run command `{program}`: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command `{program}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("no frames were extracted from the input video")]
    NoFramesExtracted,

    #[error("stage `{stage}` has no input frames")]
    EmptyStageInput { stage: String },

    #[error("stage `{stage}` failed on all {attempted} frames")]
    StageExhausted { stage: String, attempted: usize },

    #[error(
        "frame {index} is {found_width}x{found_height}, expected {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        index: u32,
        expected_width: u32,
        expected_height: u32,
        found_width: u32,
        found_height: u32,
    },

    #[error("downscaling {width}x{height} by {factor} leaves a zero-sized frame")]
    ZeroSizedFrame { width: u32, height: u32, factor: f64 },

    #[error("foreground output is {found_width}x{found_height}, input was {width}x{height}")]
    ForegroundSize {
        width: u32,
        height: u32,
        found_width: u32,
        found_height: u32,
    },

    #[error("color quantization failed: {0}")]
    Quantize(#[from] imagequant::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{stage} stage failed with {frames_completed} frames carried in: {source}")]
    PipelineFailure {
        stage: String,
        frames_completed: usize,
        #[source]
        source: Box<AppError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Coarse classification used when reporting a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    FatalInput,
    StageExhausted,
    PerFrame,
    DimensionMismatch,
    ExternalTool,
    Config,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::FatalInput => "fatal input error",
            ErrorKind::StageExhausted => "stage exhausted",
            ErrorKind::PerFrame => "per-frame error",
            ErrorKind::DimensionMismatch => "dimension mismatch",
            ErrorKind::ExternalTool => "external tool error",
            ErrorKind::Config => "configuration error",
            ErrorKind::Io => "i/o error",
        };
        f.write_str(name)
    }
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InputNotFound(_)
            | AppError::NoFramesExtracted
            | AppError::EmptyStageInput { .. } => ErrorKind::FatalInput,
            AppError::MissingFfmpeg
            | AppError::MissingRembg
            | AppError::CommandSpawn { .. }
            | AppError::CommandFailed { .. } => ErrorKind::ExternalTool,
            AppError::StageExhausted { .. } => ErrorKind::StageExhausted,
            AppError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            AppError::ZeroSizedFrame { .. }
            | AppError::ForegroundSize { .. }
            | AppError::Quantize(_)
            | AppError::Image(_) => ErrorKind::PerFrame,
            AppError::InvalidConfig(_) => ErrorKind::Config,
            AppError::PipelineFailure { source, .. } => source.kind(),
            AppError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn at_stage(self, stage: impl Into<String>, frames_completed: usize) -> Self {
        AppError::PipelineFailure {
            stage: stage.into(),
            frames_completed,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_failure_names_stage_and_count() {
        let err = AppError::StageExhausted {
            stage: "pixelate".to_string(),
            attempted: 3,
        }
        .at_stage("pixelate", 0);

        let message = err.to_string();
        assert!(message.contains("pixelate stage failed with 0 frames carried in"));
        assert!(message.contains("all 3 frames"));
        assert_eq!(err.kind(), ErrorKind::StageExhausted);
    }

    #[test]
    fn command_failures_are_external_tool_errors() {
        let err = AppError::CommandFailed {
            program: "ffmpeg".to_string(),
            code: Some(1),
            stderr: "boom".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ExternalTool);
        assert_eq!(err.kind().to_string(), "external tool error");
    }
}
