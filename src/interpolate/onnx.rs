use std::fmt::Display;
use std::path::Path;
use image::RgbImage;
use log::{debug, info};
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use crate::error::SynthesisError;
use crate::frame::Frame;
use crate::interpolate::synthesizer::{check_pair, FrameSynthesizer};

const INPUT_X0: &str = "x0";
const INPUT_X1: &str = "x1";
const INPUT_TIME: &str = "time";
const OUTPUT_IMAGE: &str = "image";

fn inference_error(e: impl Display) -> SynthesisError {
    SynthesisError::Inference(e.to_string())
}

fn load_error(model_path: &Path, e: impl Display) -> SynthesisError {
    SynthesisError::ModelLoad {
        path: model_path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn create_model_session(model_path: &Path, threads: usize) -> Result<Session, SynthesisError> {
    Session::builder().map_err(|e| load_error(model_path, e))?
        .with_optimization_level(GraphOptimizationLevel::Level3).map_err(|e| load_error(model_path, e))?
        .with_intra_threads(threads).map_err(|e| load_error(model_path, e))?
        .commit_from_file(model_path).map_err(|e| load_error(model_path, e))
}

/// Learned frame interpolation through an ONNX model.
///
/// The model takes two NHWC float frames in 0..1 (`x0`, `x1`) plus a `[1, 1]` `time`
/// tensor and returns the in-between frame as `image`, the interface FILM style models export.
pub struct OnnxSynthesizer {
    session: Session,
    name: String,
}

impl OnnxSynthesizer {
    pub fn load(model_path: impl AsRef<Path>, threads: usize) -> Result<Self, SynthesisError> {
        let model_path = model_path.as_ref();
        if !model_path.is_file() {
            return Err(load_error(model_path, "file not found"));
        }
        let session = create_model_session(model_path, threads.max(1))?;
        let name = model_name(model_path);
        info!("Loaded interpolation model \"{}\"", model_path.display());
        Ok(Self { session, name })
    }
}

fn model_name(model_path: &Path) -> String {
    let stem = model_path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| model_path.display().to_string());
    format!("onnx:{}", stem)
}

fn to_tensor_data(frame: &Frame) -> Vec<f32> {
    frame.as_raw().iter().map(|v| *v as f32 / 255.0).collect()
}

impl FrameSynthesizer for OnnxSynthesizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn synthesize(&mut self, prev: &Frame, next: &Frame, time: f32) -> Result<Frame, SynthesisError> {
        check_pair(prev, next)?;
        let (width, height) = prev.dimensions();
        let shape = [1, height as usize, width as usize, 3];
        let expected = shape.iter().product::<usize>();

        let x0 = Tensor::from_array((shape, to_tensor_data(prev))).map_err(inference_error)?;
        let x1 = Tensor::from_array((shape, to_tensor_data(next))).map_err(inference_error)?;
        let t = Tensor::from_array(([1usize, 1], vec![time])).map_err(inference_error)?;

        let outputs = self.session
            .run(inputs![INPUT_X0 => x0, INPUT_X1 => x1, INPUT_TIME => t])
            .map_err(inference_error)?;
        let output = outputs.get(OUTPUT_IMAGE)
            .ok_or_else(|| inference_error(format!("model has no \"{}\" output", OUTPUT_IMAGE)))?;
        let (_, values): (_, &[f32]) = output.try_extract_tensor().map_err(inference_error)?;
        if values.len() != expected {
            return Err(SynthesisError::OutputShape { expected, actual: values.len() });
        }
        debug!("Model produced {}x{} frame at t={:.2}", width, height, time);

        let data = values.iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();
        Ok(RgbImage::from_raw(width, height, data).expect("Output length was checked"))
    }
}
