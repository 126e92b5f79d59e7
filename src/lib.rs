pub mod animation;
pub mod background;
pub mod cli;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod pixelate;
pub mod quantize;
pub mod spritesheet;
pub mod stage;
pub mod video;
