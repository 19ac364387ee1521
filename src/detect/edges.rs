use image::GrayImage;
use imageproc::edges::canny;

pub const CANNY_LOW: f32 = 100.0;
pub const CANNY_HIGH: f32 = 200.0;
const EPSILON: f64 = 1e-6;

/// Binary edge map (0 or 255) with the fixed Canny thresholds
pub fn edge_map(gray: &GrayImage) -> GrayImage {
    if gray.width() < 3 || gray.height() < 3 {
        return GrayImage::new(gray.width(), gray.height());
    }
    canny(gray, CANNY_LOW, CANNY_HIGH)
}

/// Number of edge pixels
pub fn edge_energy(gray: &GrayImage) -> f64 {
    edge_map(gray).as_raw().iter().filter(|v| **v > 0).count() as f64
}

/// Edge energy of the synthesized frame relative to the mean of its neighbors, 1.0 = parity.
///
/// Both sides carry the epsilon so edgeless frames compare as parity instead of zero.
pub fn edge_preservation(prev: &GrayImage, next: &GrayImage, synthesized: &GrayImage) -> f64 {
    let neighbors = (edge_energy(prev) + edge_energy(next)) / 2.0;
    (edge_energy(synthesized) + EPSILON) / (neighbors + EPSILON)
}
