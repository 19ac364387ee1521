use std::str::FromStr;
use log::{info, warn};
use crate::Args;
use crate::error::{PipelineError, SynthesisError};
use crate::frame::Frame;

pub mod scene_cut;
pub mod synthesizer;
pub mod onnx;

use scene_cut::SceneCutDetector;
use synthesizer::{FrameSynthesizer, LinearBlend};
use onnx::OnnxSynthesizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SynthesizerKind {
    /// Learned model if it loads, linear blending otherwise
    #[default]
    Auto,
    /// Learned model only, failing to load it is fatal
    Model,
    /// Linear blending only
    Linear,
}

impl FromStr for SynthesizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "model" => Ok(Self::Model),
            "linear" => Ok(Self::Linear),
            other => Err(format!("Unknown synthesizer \"{}\", expected auto, model or linear", other)),
        }
    }
}

/// Picks the synthesizer for a whole run. The choice is never revisited mid-run.
pub fn select_synthesizer(args: &Args) -> Result<Box<dyn FrameSynthesizer>, PipelineError> {
    let load_model = || -> Result<OnnxSynthesizer, SynthesisError> {
        let path = args.model_path.as_ref().ok_or_else(|| SynthesisError::ModelLoad {
            path: Default::default(),
            reason: "no model path configured".into(),
        })?;
        OnnxSynthesizer::load(path, args.model_threads)
    };

    let synthesizer: Box<dyn FrameSynthesizer> = match args.synthesizer {
        SynthesizerKind::Linear => Box::new(LinearBlend),
        SynthesizerKind::Model => Box::new(load_model().map_err(|e| PipelineError::Config(e.to_string()))?),
        SynthesizerKind::Auto => match load_model() {
            Ok(model) => Box::new(model),
            Err(e) => {
                warn!("Could not initialize interpolation model ({}). Using linear blending.", e);
                Box::new(LinearBlend)
            }
        },
    };
    info!("Using {} frame synthesizer", synthesizer.name());
    Ok(synthesizer)
}

/// Scene-cut aware interpolation: blends within a shot, duplicates an endpoint across a cut
pub struct Interpolator {
    scene_cut: SceneCutDetector,
    synthesizer: Box<dyn FrameSynthesizer>,
}

impl Interpolator {
    pub fn new(scene_cut: SceneCutDetector, synthesizer: Box<dyn FrameSynthesizer>) -> Self {
        Self { scene_cut, synthesizer }
    }

    pub fn from_args(args: &Args) -> Result<Self, PipelineError> {
        Ok(Self::new(
            SceneCutDetector::new(args.scene_cut_threshold),
            select_synthesizer(args)?,
        ))
    }

    pub fn synthesizer_name(&self) -> &str {
        self.synthesizer.name()
    }

    pub fn interpolate(&mut self, prev: &Frame, next: &Frame, time: f32) -> Result<Frame, SynthesisError> {
        let cut = self.scene_cut.detect(prev, next);
        if cut.is_cut {
            warn!("Scene cut detected (similarity: {:.2}). Duplicating instead of interpolating.", cut.similarity);
            return Ok(if time < 0.5 { prev.clone() } else { next.clone() });
        }
        let frame = self.synthesizer.synthesize(prev, next, time)?;
        if frame.dimensions() != prev.dimensions() {
            return Err(SynthesisError::FrameSize(frame.dimensions(), prev.dimensions()));
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    struct Failing;

    impl FrameSynthesizer for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn synthesize(&mut self, _: &Frame, _: &Frame, _: f32) -> Result<Frame, SynthesisError> {
            Err(SynthesisError::Inference("boom".into()))
        }
    }

    fn linear() -> Interpolator {
        Interpolator::new(SceneCutDetector::new(0.3), Box::new(LinearBlend))
    }

    fn noisy(seed: u8) -> Frame {
        RgbImage::from_fn(32, 24, |x, y| {
            let v = ((x * 37 + y * 91 + seed as u32 * 13) % 200) as u8;
            Rgb([v, 255 - v, (v / 2) + 40])
        })
    }

    #[test]
    fn cut_returns_endpoints_bit_for_bit() {
        let prev = RgbImage::from_pixel(16, 16, Rgb([230, 20, 20]));
        let next = RgbImage::from_pixel(16, 16, Rgb([20, 20, 230]));
        let mut interpolator = linear();
        assert_eq!(interpolator.interpolate(&prev, &next, 0.3).unwrap(), prev);
        assert_eq!(interpolator.interpolate(&prev, &next, 0.7).unwrap(), next);
        assert_eq!(interpolator.interpolate(&prev, &next, 0.5).unwrap(), next);
    }

    #[test]
    fn cut_skips_the_synthesizer() {
        let prev = RgbImage::from_pixel(16, 16, Rgb([230, 20, 20]));
        let next = RgbImage::from_pixel(16, 16, Rgb([20, 20, 230]));
        let mut interpolator = Interpolator::new(SceneCutDetector::new(0.3), Box::new(Failing));
        assert!(interpolator.interpolate(&prev, &next, 0.5).is_ok());
    }

    #[test]
    fn same_shot_is_synthesized() {
        let frame = noisy(1);
        let mut interpolator = linear();
        assert_eq!(interpolator.interpolate(&frame, &frame, 0.5).unwrap(), frame);
    }

    #[test]
    fn synthesis_failure_propagates() {
        let frame = noisy(2);
        let mut interpolator = Interpolator::new(SceneCutDetector::new(0.3), Box::new(Failing));
        assert!(interpolator.interpolate(&frame, &frame, 0.5).is_err());
    }

    #[test]
    fn selection_falls_back_to_linear() {
        let args = Args { model_path: Some("missing.onnx".into()), ..Args::default() };
        assert_eq!(select_synthesizer(&args).unwrap().name(), "linear-blend");
    }

    #[test]
    fn strict_model_selection_is_a_config_error() {
        let args = Args { synthesizer: SynthesizerKind::Model, model_path: None, ..Args::default() };
        assert!(matches!(select_synthesizer(&args), Err(PipelineError::Config(_))));
    }

    #[test]
    fn parse_synthesizer_kind() {
        assert_eq!("Linear".parse::<SynthesizerKind>().unwrap(), SynthesizerKind::Linear);
        assert!("film".parse::<SynthesizerKind>().is_err());
    }
}
