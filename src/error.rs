use std::path::PathBuf;
use thiserror::Error;

/// Failures of the decode/encode collaborators
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Input file \"{}\" does not exist", .0.display())]
    Missing(PathBuf),
    #[error("Could not probe \"{}\": {}", .path.display(), .reason)]
    Probe { path: PathBuf, reason: String },
    #[error("Decoder failed: {0}")]
    Decode(String),
    #[error("Encoder failed: {0}")]
    Encode(String),
    #[error("Frame is {actual:?}, expected {expected:?}")]
    FrameSize { expected: (u32, u32), actual: (u32, u32) },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Could not load model \"{}\": {}", .path.display(), .reason)]
    ModelLoad { path: PathBuf, reason: String },
    #[error("Model inference failed: {0}")]
    Inference(String),
    #[error("Model produced {actual} values, expected {expected}")]
    OutputShape { expected: usize, actual: usize },
    #[error("Frames differ in size: {0:?} vs {1:?}")]
    FrameSize((u32, u32), (u32, u32)),
}

#[derive(Error, Debug, PartialEq)]
pub enum DetectError {
    #[error("Frame dimensions do not match: prev {prev:?}, next {next:?}, synthesized {synthesized:?}")]
    DimensionMismatch {
        prev: (u32, u32),
        next: (u32, u32),
        synthesized: (u32, u32),
    },
    #[error("Frame is empty")]
    Empty,
}

#[derive(Error, Debug)]
pub enum RemuxError {
    #[error("File \"{}\" does not exist", .0.display())]
    Missing(PathBuf),
    #[error("Could not run ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("ffmpeg exited with {0}")]
    Failed(std::process::ExitStatus),
    #[error("Could not replace \"{}\": {}", .path.display(), .source)]
    Replace { path: PathBuf, source: std::io::Error },
}

/// Fatal outcomes of a pipeline run. Everything else degrades a single pair.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input has no frames")]
    EmptyInput,
    #[error("Could not open input: {0}")]
    Input(VideoError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Output failed: {0}")]
    Output(VideoError),
    #[error("Could not write report: {0}")]
    Report(#[from] std::io::Error),
    #[error("Could not serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
