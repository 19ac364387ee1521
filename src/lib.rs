use std::path::PathBuf;

pub mod error;
pub mod frame;
pub mod utils;
pub mod video;
pub mod interpolate;
pub mod detect;
pub mod explain;
pub mod debug_artifacts;
pub mod report;
pub mod pipeline;
pub mod remux;
pub mod choppify;

pub use debug_artifacts::DebugPolicy;
pub use interpolate::SynthesizerKind;

#[derive(Debug, Clone)]
pub struct Args {
    /// Fraction of histogram dissimilarity that counts as a scene cut.
    /// Frames whose similarity drops below `1 - scene_cut_threshold` are never blended.
    /// Range: 0.0..1.0 (higher = fewer cuts detected)
    pub scene_cut_threshold: f64,
    /// Which frame synthesizer to use for the whole run
    pub synthesizer: SynthesizerKind,
    /// ONNX frame interpolation model, taking `x0`, `x1` (NHWC, 0..1) and `time`
    pub model_path: Option<PathBuf>,
    /// Intra-op threads for the model session
    /// Range: 1..
    pub model_threads: usize,
    /// When to write debug composites
    pub debug_policy: DebugPolicy,
    /// Directory debug composites are written to
    pub debug_dir: PathBuf,
    /// Also write the previous, synthesized and next frames next to each composite
    pub save_raw_frames: bool,
    /// Frames wider than this are downscaled before optical flow estimation
    /// Range: 16.. (lower = faster, coarser motion estimate)
    pub max_flow_width: u32,
    /// Copy the input's audio into the output after encoding
    pub remux_audio: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            scene_cut_threshold: 0.3,
            synthesizer: SynthesizerKind::Auto,
            model_path: None,
            model_threads: 4,
            debug_policy: DebugPolicy::Off,
            debug_dir: PathBuf::from("debug_frames"),
            save_raw_frames: false,
            max_flow_width: 640,
            remux_audio: true,
        }
    }
}

pub const VIDEO_SWS_FLAGS: &str = "accurate_rnd+full_chroma_inp+full_chroma_int";

pub const VIDEO_DECODE_ARGS: [&str; 7] = [
    "-sws_flags", VIDEO_SWS_FLAGS, // Important to get same(ish) colors
    "-f", "rawvideo",
    "-pix_fmt", "rgb24",
    "-"
];

/// Encoder arguments used when none are given
pub const DEFAULT_ENCODE_ARGS: [&str; 6] = [
    "-c:v", "libx264",
    "-pix_fmt", "yuv420p",
    "-crf", "18",
];
