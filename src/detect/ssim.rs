use image::GrayImage;

const WINDOW: usize = 7;
const K1: f64 = 0.01;
const K2: f64 = 0.03;
const DATA_RANGE: f64 = 255.0;

/// Summed-area table with a zero row/column in front
struct Integral {
    width: usize,
    sums: Vec<f64>,
}

impl Integral {
    fn new(width: usize, height: usize, value: impl Fn(usize) -> f64) -> Self {
        let stride = width + 1;
        let mut sums = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row_sum = 0.0;
            for x in 0..width {
                row_sum += value(y * width + x);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row_sum;
            }
        }
        Self { width, sums }
    }

    /// Sum over the `size`×`size` window with top-left corner (x, y)
    #[inline]
    fn window(&self, x: usize, y: usize, size: usize) -> f64 {
        let stride = self.width + 1;
        let (x1, y1) = (x + size, y + size);
        self.sums[y1 * stride + x1] - self.sums[y * stride + x1] - self.sums[y1 * stride + x] + self.sums[y * stride + x]
    }
}

fn ssim_from_moments(n: f64, sum_a: f64, sum_b: f64, sum_aa: f64, sum_bb: f64, sum_ab: f64) -> f64 {
    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);
    let mean_a = sum_a / n;
    let mean_b = sum_b / n;
    // Sample (co)variance
    let correction = if n > 1.0 { n / (n - 1.0) } else { 1.0 };
    let var_a = (sum_aa / n - mean_a * mean_a) * correction;
    let var_b = (sum_bb / n - mean_b * mean_b) * correction;
    let cov = (sum_ab / n - mean_a * mean_b) * correction;
    ((2.0 * mean_a * mean_b + c1) * (2.0 * cov + c2))
        / ((mean_a * mean_a + mean_b * mean_b + c1) * (var_a + var_b + c2))
}

/// Mean structural similarity of two grayscale images over 7×7 uniform windows.
///
/// Images smaller than one window are compared as a single window.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> f64 {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let (width, height) = (a.width() as usize, a.height() as usize);
    let (pa, pb) = (a.as_raw(), b.as_raw());
    if width == 0 || height == 0 {
        return 1.0;
    }

    if width < WINDOW || height < WINDOW {
        let n = (width * height) as f64;
        let mut sums = [0.0f64; 5];
        for (&x, &y) in pa.iter().zip(pb) {
            let (x, y) = (x as f64, y as f64);
            sums[0] += x;
            sums[1] += y;
            sums[2] += x * x;
            sums[3] += y * y;
            sums[4] += x * y;
        }
        return ssim_from_moments(n, sums[0], sums[1], sums[2], sums[3], sums[4]);
    }

    let ia = Integral::new(width, height, |i| pa[i] as f64);
    let ib = Integral::new(width, height, |i| pb[i] as f64);
    let iaa = Integral::new(width, height, |i| (pa[i] as f64).powi(2));
    let ibb = Integral::new(width, height, |i| (pb[i] as f64).powi(2));
    let iab = Integral::new(width, height, |i| pa[i] as f64 * pb[i] as f64);

    let n = (WINDOW * WINDOW) as f64;
    let mut total = 0.0;
    let mut count = 0usize;
    for y in 0..=height - WINDOW {
        for x in 0..=width - WINDOW {
            total += ssim_from_moments(
                n,
                ia.window(x, y, WINDOW),
                ib.window(x, y, WINDOW),
                iaa.window(x, y, WINDOW),
                ibb.window(x, y, WINDOW),
                iab.window(x, y, WINDOW),
            );
            count += 1;
        }
    }
    total / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn pattern(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([((x * 29 + y * 53) % 256) as u8]))
    }

    #[test]
    fn identical_images_score_one() {
        let img = pattern(32, 24);
        assert!((ssim(&img, &img) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn flat_identical_images_score_one() {
        let img = GrayImage::from_pixel(16, 16, Luma([77]));
        assert!((ssim(&img, &img) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn inverted_image_scores_low() {
        let img = pattern(32, 24);
        let mut inverted = img.clone();
        image::imageops::invert(&mut inverted);
        assert!(ssim(&img, &inverted) < 0.0);
    }

    #[test]
    fn small_images_use_a_single_window() {
        let a = pattern(4, 4);
        assert!((ssim(&a, &a) - 1.0).abs() < 1e-9);
        let b = GrayImage::from_pixel(4, 4, Luma([0]));
        assert!(ssim(&a, &b) < 0.5);
    }

    #[test]
    fn noise_lowers_similarity() {
        let img = pattern(32, 32);
        let noisy = GrayImage::from_fn(32, 32, |x, y| {
            let v = img.get_pixel(x, y).0[0];
            Luma([if (x + y) % 2 == 0 { v.saturating_add(40) } else { v.saturating_sub(40) }])
        });
        let score = ssim(&img, &noisy);
        assert!(score < 0.95 && score > 0.0, "ssim {}", score);
    }
}
