use crate::frame::Frame;

const HUE_BINS: usize = 50;
const SATURATION_BINS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneCut {
    pub is_cut: bool,
    /// Histogram correlation in -1.0..=1.0, 1.0 = identical color distribution
    pub similarity: f64,
}

/// Decides whether two frames belong to different shots by correlating
/// their hue/saturation histograms.
#[derive(Debug, Clone, Copy)]
pub struct SceneCutDetector {
    threshold: f64,
}

impl SceneCutDetector {
    /// `threshold` is the tolerated dissimilarity, a cut needs similarity below `1 - threshold`
    pub fn new(threshold: f64) -> Self {
        Self { threshold: threshold.clamp(0.0, 2.0) }
    }

    pub fn similarity_floor(&self) -> f64 {
        1.0 - self.threshold
    }

    pub fn detect(&self, a: &Frame, b: &Frame) -> SceneCut {
        let similarity = correlation(&hue_saturation_histogram(a), &hue_saturation_histogram(b));
        SceneCut {
            is_cut: similarity < self.similarity_floor(),
            similarity,
        }
    }
}

/// Returns hue in 0.0..360.0 and saturation in 0.0..=1.0
#[inline]
fn hue_saturation(r: u8, g: u8, b: u8) -> (f32, f32) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta == 0.0 {
        return (0.0, 0.0);
    }
    let saturation = delta / max;
    let hue = if max == r {
        60.0 * ((g - b) / delta)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    (hue.rem_euclid(360.0), saturation)
}

/// 2-D hue/saturation histogram normalized to unit mass
fn hue_saturation_histogram(frame: &Frame) -> Vec<f64> {
    let mut hist = vec![0.0f64; HUE_BINS * SATURATION_BINS];
    for pixel in frame.as_raw().chunks_exact(3) {
        let (hue, saturation) = hue_saturation(pixel[0], pixel[1], pixel[2]);
        let h = ((hue / 360.0 * HUE_BINS as f32) as usize).min(HUE_BINS - 1);
        let s = ((saturation * SATURATION_BINS as f32) as usize).min(SATURATION_BINS - 1);
        hist[h * SATURATION_BINS + s] += 1.0;
    }
    let total: f64 = hist.iter().sum();
    if total > 0.0 {
        hist.iter_mut().for_each(|v| *v /= total);
    }
    hist
}

/// Pearson correlation of two histograms
fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        // Flat histograms only correlate with themselves
        return if a == b { 1.0 } else { 0.0 };
    }
    (cov / denom).clamp(-1.0, 1.0)
}
