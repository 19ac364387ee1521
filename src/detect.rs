use log::debug;
use serde::{Deserialize, Serialize};
use crate::error::DetectError;
use crate::frame::{average, to_grayscale, Frame};

pub mod flow;
pub mod ssim;
pub mod edges;

use flow::{estimate_flow, FlowField};

/// Quality signals for one synthesized frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    /// Mean optical flow magnitude between the neighbors, in pixels
    pub motion_complexity: f64,
    /// SSIM of the synthesized frame against the 50/50 blend of its neighbors
    pub temporal_consistency: f64,
    /// Edge energy of the synthesized frame relative to its neighbors, 1.0 = parity
    pub edge_preservation: f64,
    /// Mean absolute byte difference between the neighbors
    pub occlusion_risk: f64,
}

/// Mean absolute difference over all channels, a cheap stand-in for forward/backward flow checks
pub fn mean_abs_diff(a: &Frame, b: &Frame) -> f64 {
    let raw = a.as_raw();
    if raw.is_empty() {
        return 0.0;
    }
    let sum: u64 = raw.iter().zip(b.as_raw())
        .map(|(x, y)| x.abs_diff(*y) as u64)
        .sum();
    sum as f64 / raw.len() as f64
}

/// Metrics of one pair plus the motion field they were derived from
#[derive(Debug, Clone)]
pub struct Analysis {
    pub metrics: Metrics,
    pub flow: FlowField,
}

#[derive(Debug, Clone, Copy)]
pub struct ArtifactDetector {
    max_flow_width: u32,
}

impl ArtifactDetector {
    pub fn new(max_flow_width: u32) -> Self {
        Self { max_flow_width }
    }

    pub fn detect(&self, prev: &Frame, next: &Frame, synthesized: &Frame) -> Result<Analysis, DetectError> {
        let dims = (prev.dimensions(), next.dimensions(), synthesized.dimensions());
        if dims.0 != dims.1 || dims.0 != dims.2 {
            return Err(DetectError::DimensionMismatch { prev: dims.0, next: dims.1, synthesized: dims.2 });
        }
        if dims.0.0 == 0 || dims.0.1 == 0 {
            return Err(DetectError::Empty);
        }

        let (gray_prev, (gray_next, gray_synth)) = rayon::join(
            || to_grayscale(prev),
            || rayon::join(|| to_grayscale(next), || to_grayscale(synthesized)),
        );

        let blended = average(prev, next).ok_or(DetectError::DimensionMismatch {
            prev: dims.0,
            next: dims.1,
            synthesized: dims.2,
        })?;

        // All four are independent, the value is only assembled once every one is done
        let ((flow, temporal_consistency), (edge_preservation, occlusion_risk)) = rayon::join(
            || rayon::join(
                || estimate_flow(&gray_prev, &gray_next, self.max_flow_width),
                || ssim::ssim(&gray_synth, &to_grayscale(&blended)),
            ),
            || rayon::join(
                || edges::edge_preservation(&gray_prev, &gray_next, &gray_synth),
                || mean_abs_diff(prev, next),
            ),
        );

        let metrics = Metrics {
            motion_complexity: flow.mean_magnitude(),
            temporal_consistency,
            edge_preservation,
            occlusion_risk,
        };
        debug!("{:?}", metrics);
        Ok(Analysis { metrics, flow })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn textured(seed: u64) -> Frame {
        let mut rng = StdRng::seed_from_u64(seed);
        RgbImage::from_fn(48, 32, |x, y| {
            let base = ((x / 6 + y / 6) % 2) as u8 * 120 + 60;
            let noise: u8 = rng.random_range(0..20);
            Rgb([base + noise, base / 2 + noise, 255 - base])
        })
    }

    #[test]
    fn identical_frames_are_consistent_and_still() {
        let frame = textured(7);
        let analysis = ArtifactDetector::new(640).detect(&frame, &frame, &frame).unwrap();
        assert_eq!(analysis.flow.vectors.len(), 6 * 4);
        let metrics = analysis.metrics;
        assert!(metrics.temporal_consistency >= 0.99);
        assert!(metrics.motion_complexity.abs() < 1e-9);
        assert!((metrics.edge_preservation - 1.0).abs() < 1e-9);
        assert_eq!(metrics.occlusion_risk, 0.0);
    }

    #[test]
    fn mismatched_frames_are_rejected() {
        let a = RgbImage::new(8, 8);
        let b = RgbImage::new(8, 6);
        let err = ArtifactDetector::new(640).detect(&a, &a, &b).unwrap_err();
        assert!(matches!(err, DetectError::DimensionMismatch { synthesized: (8, 6), .. }));
    }

    #[test]
    fn empty_frames_are_rejected() {
        let a = RgbImage::new(0, 0);
        assert_eq!(ArtifactDetector::new(640).detect(&a, &a, &a).unwrap_err(), DetectError::Empty);
    }

    #[test]
    fn occlusion_is_mean_abs_diff() {
        let a = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let b = RgbImage::from_pixel(4, 4, Rgb([40, 20, 0]));
        assert!((mean_abs_diff(&a, &b) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn wrong_frame_lowers_consistency() {
        let prev = textured(1);
        let mut inverted = prev.clone();
        image::imageops::invert(&mut inverted);
        let metrics = ArtifactDetector::new(640).detect(&prev, &prev, &inverted).unwrap().metrics;
        assert!(metrics.temporal_consistency < 0.8);
    }
}
