use ffmpeg_sidecar::event::OutputVideoFrame;
use image::{GrayImage, RgbImage};
use crate::error::VideoError;

/// A decoded rgb24 video frame
pub type Frame = RgbImage;

#[inline]
fn get_luma(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32 * 77) + (g as u32 * 150) + (b as u32 * 29)) >> 8 // Approx Rec. 709 luma
}

pub fn to_grayscale(frame: &Frame) -> GrayImage {
    let gray = frame.as_raw()
        .chunks_exact(3)
        .map(|pixel| get_luma(pixel[0], pixel[1], pixel[2]) as u8)
        .collect();
    GrayImage::from_raw(frame.width(), frame.height(), gray)
        .expect("Grayscale buffer has one byte per pixel")
}

pub fn frame_from_output(frame: OutputVideoFrame) -> Result<Frame, VideoError> {
    let (width, height) = (frame.width, frame.height);
    let actual = frame.data.len();
    RgbImage::from_raw(width, height, frame.data)
        .ok_or_else(|| VideoError::Decode(format!(
            "frame #{} has {} bytes, expected {}", frame.frame_num, actual, width as usize * height as usize * 3
        )))
}

/// Pixel-wise `a * (1 - t) + b * t`, rounded to nearest. `None` if the sizes differ.
pub fn blend(a: &Frame, b: &Frame, t: f32) -> Option<Frame> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    let t = t.clamp(0.0, 1.0);
    let data = a.as_raw().iter().zip(b.as_raw())
        .map(|(&x, &y)| (x as f32 * (1.0 - t) + y as f32 * t).round() as u8)
        .collect();
    RgbImage::from_raw(a.width(), a.height(), data)
}

/// Exact 50/50 average, rounding halves up. `None` if the sizes differ.
pub fn average(a: &Frame, b: &Frame) -> Option<Frame> {
    if a.dimensions() != b.dimensions() {
        return None;
    }
    let data = a.as_raw().iter().zip(b.as_raw())
        .map(|(&x, &y)| ((x as u16 + y as u16 + 1) / 2) as u8)
        .collect();
    RgbImage::from_raw(a.width(), a.height(), data)
}
