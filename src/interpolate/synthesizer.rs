use crate::error::SynthesisError;
use crate::frame::{blend, Frame};

/// Generates a frame that sits at `time` (0.0 = `prev`, 1.0 = `next`) between two frames
pub trait FrameSynthesizer: Send {
    /// Name recorded in the report metadata
    fn name(&self) -> &str;

    fn synthesize(&mut self, prev: &Frame, next: &Frame, time: f32) -> Result<Frame, SynthesisError>;
}

pub(crate) fn check_pair(prev: &Frame, next: &Frame) -> Result<(), SynthesisError> {
    if prev.dimensions() != next.dimensions() {
        return Err(SynthesisError::FrameSize(prev.dimensions(), next.dimensions()));
    }
    Ok(())
}

/// Cross-fade between the two frames, always available
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearBlend;

impl FrameSynthesizer for LinearBlend {
    fn name(&self) -> &str {
        "linear-blend"
    }

    fn synthesize(&mut self, prev: &Frame, next: &Frame, time: f32) -> Result<Frame, SynthesisError> {
        blend(prev, next, time).ok_or(SynthesisError::FrameSize(prev.dimensions(), next.dimensions()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn linear_blend_midpoint() {
        let a = RgbImage::from_pixel(3, 3, Rgb([0, 0, 0]));
        let b = RgbImage::from_pixel(3, 3, Rgb([100, 200, 50]));
        let mid = LinearBlend.synthesize(&a, &b, 0.5).unwrap();
        assert_eq!(mid.get_pixel(1, 1), &Rgb([50, 100, 25]));
    }

    #[test]
    fn linear_blend_rejects_mismatched_frames() {
        let a = RgbImage::new(3, 3);
        let b = RgbImage::new(4, 3);
        assert!(matches!(LinearBlend.synthesize(&a, &b, 0.5), Err(SynthesisError::FrameSize(..))));
    }
}
