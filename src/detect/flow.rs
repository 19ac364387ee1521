use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::GrayImage;
use log::debug;
use rayon::prelude::*;

pub const BLOCK_SIZE: u32 = 8;
const SEARCH_RADIUS: isize = 16;

// Large and small diamond search patterns
const LDSP: [(isize, isize); 8] = [
    ( 0, -2), (-1, -1), (1, -1),
    (-2,  0),  ( 2,  0),
    (-1,  1), (1,  1), ( 0,  2),
];

const SDSP: [(isize, isize); 5] = [
    ( 0, -1), (-1,  0),
    (0, 0),
    ( 1,  0), ( 0,  1),
];

/// Block-wise motion between two grayscale frames, one vector per block,
/// expressed in pixels of the original (not downscaled) frame.
#[derive(Debug, Clone)]
pub struct FlowField {
    pub cols: usize,
    pub rows: usize,
    /// Block edge length in original frame pixels
    pub block_size: f32,
    pub vectors: Vec<(f32, f32)>,
}

impl FlowField {
    pub fn magnitudes(&self) -> impl Iterator<Item = f32> + '_ {
        self.vectors.iter().map(|(vx, vy)| (vx * vx + vy * vy).sqrt())
    }

    /// Mean vector length, 0.0 for an empty field
    pub fn mean_magnitude(&self) -> f64 {
        if self.vectors.is_empty() {
            return 0.0;
        }
        self.magnitudes().map(|m| m as f64).sum::<f64>() / self.vectors.len() as f64
    }

    /// Magnitude of the block covering pixel (x, y) of the original frame
    pub fn magnitude_at(&self, x: u32, y: u32) -> f32 {
        if self.vectors.is_empty() {
            return 0.0;
        }
        let col = ((x as f32 / self.block_size) as usize).min(self.cols - 1);
        let row = ((y as f32 / self.block_size) as usize).min(self.rows - 1);
        let (vx, vy) = self.vectors[row * self.cols + col];
        (vx * vx + vy * vy).sqrt()
    }
}

struct BlockSearch<'a> {
    img1: &'a [u8],
    img2: &'a [u8],
    width: usize,
    height: usize,
    block: usize,
}

impl BlockSearch<'_> {
    /// Mean absolute difference between the block at (x0, y0) in `img1`
    /// and the block displaced by (dx, dy) in `img2`, `None` if it leaves the frame.
    fn cost(&self, x0: usize, y0: usize, dx: isize, dy: isize) -> Option<f32> {
        if dx.abs() > SEARCH_RADIUS || dy.abs() > SEARCH_RADIUS {
            return None;
        }
        let x2 = x0.checked_add_signed(dx)?;
        let y2 = y0.checked_add_signed(dy)?;
        if x2 + self.block > self.width || y2 + self.block > self.height {
            return None;
        }
        let mut sum = 0u32;
        for row in 0..self.block {
            let i1 = (y0 + row) * self.width + x0;
            let i2 = (y2 + row) * self.width + x2;
            let s1 = &self.img1[i1..i1 + self.block];
            let s2 = &self.img2[i2..i2 + self.block];
            sum += s1.iter().zip(s2).map(|(a, b)| a.abs_diff(*b) as u32).sum::<u32>();
        }
        Some(sum as f32 / (self.block * self.block) as f32)
    }

    fn search_once(&self, x0: usize, y0: usize, best: &mut (isize, isize), best_score: &mut f32, pattern: &[(isize, isize)]) -> bool {
        let mut changed = false;
        let mut current_best = *best;
        for (dx, dy) in pattern {
            let candidate = (best.0 + dx, best.1 + dy);
            let Some(score) = self.cost(x0, y0, candidate.0, candidate.1) else { continue };
            if score < *best_score {
                *best_score = score;
                current_best = candidate;
                changed = true;
            }
        }
        *best = current_best;
        changed
    }

    /// Diamond search starting from zero motion
    fn estimate(&self, x0: usize, y0: usize) -> (isize, isize) {
        let mut best = (0, 0);
        let Some(mut best_score) = self.cost(x0, y0, 0, 0) else { return best };
        while self.search_once(x0, y0, &mut best, &mut best_score, &LDSP) {}
        self.search_once(x0, y0, &mut best, &mut best_score, &SDSP);
        best
    }
}

fn downscale(gray: &GrayImage, max_width: u32) -> Option<GrayImage> {
    let (width, height) = gray.dimensions();
    let new_width = max_width.max(BLOCK_SIZE);
    let new_height = ((height as f64 * new_width as f64 / width as f64).round() as u32).max(1);
    let src = Image::from_vec_u8(width, height, gray.as_raw().clone(), PixelType::U8).ok()?;
    let mut dst = Image::new(new_width, new_height, PixelType::U8);
    let resize_options = ResizeOptions::new()
        .resize_alg(ResizeAlg::Convolution(FilterType::CatmullRom));
    if let Err(e) = Resizer::new().resize(&src, &mut dst, &resize_options) {
        debug!("Flow downscale failed, using full resolution: {}", e);
        return None;
    }
    GrayImage::from_raw(new_width, new_height, dst.into_vec())
}

/// Estimates block motion from `prev` to `next`.
///
/// Frames wider than `max_width` are downscaled first, vectors are scaled back up.
pub fn estimate_flow(prev: &GrayImage, next: &GrayImage, max_width: u32) -> FlowField {
    debug_assert_eq!(prev.dimensions(), next.dimensions());
    let (width, _) = prev.dimensions();

    let scaled = if width > max_width.max(BLOCK_SIZE) {
        downscale(prev, max_width).zip(downscale(next, max_width))
    } else {
        None
    };
    let (img1, img2) = match &scaled {
        Some((a, b)) => (a, b),
        None => (prev, next),
    };
    let scale = width as f32 / img1.width() as f32;

    let (w, h) = (img1.width() as usize, img1.height() as usize);
    let block = (BLOCK_SIZE as usize).min(w).min(h);
    if block == 0 {
        return FlowField { cols: 0, rows: 0, block_size: BLOCK_SIZE as f32, vectors: Vec::new() };
    }
    let cols = w / block;
    let rows = h / block;
    let search = BlockSearch { img1: img1.as_raw(), img2: img2.as_raw(), width: w, height: h, block };

    let vectors = (0..rows).into_par_iter()
        .map(|row| {
            (0..cols)
                .map(|col| {
                    let (dx, dy) = search.estimate(col * block, row * block);
                    (dx as f32 * scale, dy as f32 * scale)
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .concat();

    FlowField { cols, rows, block_size: block as f32 * scale, vectors }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(shift_x: f32) -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| {
            let x = x as f32 - shift_x;
            let y = y as f32;
            let v = 128.0 + 50.0 * (x / 4.0).sin() + 50.0 * (y / 6.0 + x / 9.0).sin();
            image::Luma([v.clamp(0.0, 255.0) as u8])
        })
    }

    #[test]
    fn identical_frames_have_no_motion() {
        let frame = texture(0.0);
        let flow = estimate_flow(&frame, &frame, 640);
        assert_eq!(flow.cols, 8);
        assert_eq!(flow.rows, 8);
        assert_eq!(flow.mean_magnitude(), 0.0);
    }

    #[test]
    fn horizontal_shift_is_found() {
        let flow = estimate_flow(&texture(0.0), &texture(3.0), 640);
        let mean = flow.mean_magnitude();
        assert!(mean > 1.5 && mean < 6.0, "mean magnitude {}", mean);
        // Interior blocks should agree on the shift
        let (vx, vy) = flow.vectors[3 * flow.cols + 3];
        assert_eq!((vx, vy), (3.0, 0.0));
    }

    #[test]
    fn downscaled_vectors_are_in_full_resolution_pixels() {
        let flow = estimate_flow(&texture(0.0), &texture(4.0), 32);
        assert!(flow.block_size > BLOCK_SIZE as f32);
        assert!(flow.mean_magnitude() > 1.0);
    }

    #[test]
    fn tiny_frames_use_one_block() {
        let frame = GrayImage::new(3, 2);
        let flow = estimate_flow(&frame, &frame, 640);
        assert_eq!(flow.vectors.len(), 1);
        assert_eq!(flow.magnitude_at(2, 1), 0.0);
    }
}
