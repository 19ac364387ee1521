use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{GrayImage, ImageResult, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::filter::gaussian_blur_f32;
use imageproc::rect::Rect;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use crate::detect::edges::edge_map;
use crate::detect::flow::FlowField;
use crate::detect::Metrics;
use crate::explain::Verdict;
use crate::frame::{to_grayscale, Frame};
use crate::utils::{try_delete, TRY_MAX_TRIES, TRY_WAIT_DURATION};

/// Matches a 21×21 Gaussian kernel
const EDGE_BLUR_SIGMA: f32 = 3.5;

const OCCLUSION_FULL_SCALE: f64 = 50.0;
const MOTION_FULL_SCALE: f64 = 10.0;
const EDGE_FULL_SCALE: f64 = 2.0;

const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

/// Which pairs get debug artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugPolicy {
    #[default]
    Off,
    /// Every Nth pair, starting with the first
    Interval(usize),
    /// Every pair whose verdict is not PASS
    OnIssue,
}

impl DebugPolicy {
    pub fn should_emit(&self, index: usize, verdict: Verdict) -> bool {
        match self {
            DebugPolicy::Off => false,
            DebugPolicy::Interval(n) => *n > 0 && index % n == 0,
            DebugPolicy::OnIssue => verdict != Verdict::Pass,
        }
    }
}

impl FromStr for DebugPolicy {
    type Err = String;

    /// `off`, `on-issue` or `interval:N` (a bare `N` works too)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let interval = s.strip_prefix("interval")
            .map(|rest| rest.trim_start_matches([':', '=', ' ']))
            .unwrap_or(s.as_str());
        match s.as_str() {
            "off" | "none" => Ok(Self::Off),
            "on-issue" | "issues" => Ok(Self::OnIssue),
            _ => match interval.parse::<usize>() {
                Ok(0) => Err("Debug interval must be at least 1".to_string()),
                Ok(n) => Ok(Self::Interval(n)),
                Err(_) => Err(format!("Unknown debug policy \"{}\", expected off, on-issue or interval:N", s)),
            },
        }
    }
}

/// Files written for one pair. A missing entry means it was not saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interp: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<PathBuf>,
    /// The 2×2 diagnostic composite
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<PathBuf>,
}

impl ArtifactPaths {
    pub fn is_empty(&self) -> bool {
        self.prev.is_none() && self.interp.is_none() && self.next.is_none() && self.heatmap.is_none()
    }

    fn all(&self) -> impl Iterator<Item = &PathBuf> {
        [&self.prev, &self.interp, &self.next, &self.heatmap].into_iter().flatten()
    }
}

/// The frames and grades of one pair, as handed to the emitter
pub struct PairView<'a> {
    pub frame_number: usize,
    pub prev: &'a Frame,
    pub next: &'a Frame,
    pub synthesized: &'a Frame,
    pub metrics: &'a Metrics,
    /// Motion between `prev` and `next`, missing if the pair could not be analyzed
    pub flow: Option<&'a FlowField>,
    pub verdict: Verdict,
}

/// Renders and saves diagnostics. Never fails: errors are logged and yield no paths.
pub struct DebugArtifactEmitter {
    dir: PathBuf,
    save_raw_frames: bool,
}

impl DebugArtifactEmitter {
    pub fn new(dir: impl Into<PathBuf>, save_raw_frames: bool) -> Self {
        Self { dir: dir.into(), save_raw_frames }
    }

    pub fn emit(&self, pair: &PairView) -> ArtifactPaths {
        let mut paths = ArtifactPaths::default();
        match self.try_emit(pair, &mut paths) {
            Ok(()) => {
                debug!("Saved debug artifacts for frame {}", pair.frame_number);
                paths
            }
            Err(e) => {
                warn!("Could not save debug artifacts for frame {}: {}", pair.frame_number, e);
                for path in paths.all() {
                    if let Err(e) = try_delete(path, TRY_MAX_TRIES, TRY_WAIT_DURATION) {
                        warn!("Could not remove partial artifact \"{}\": {}", path.display(), e);
                    }
                }
                ArtifactPaths::default()
            }
        }
    }

    fn path_for(&self, frame_number: usize, suffix: &str) -> PathBuf {
        self.dir.join(format!("frame_{}_{}.jpg", frame_number, suffix))
    }

    /// Records each path before writing it so a failure can clean up after itself
    fn try_emit(&self, pair: &PairView, paths: &mut ArtifactPaths) -> ImageResult<()> {
        fs::create_dir_all(&self.dir)?;

        if self.save_raw_frames {
            for (slot, suffix, frame) in [
                (&mut paths.prev, "prev", pair.prev),
                (&mut paths.interp, "interp", pair.synthesized),
                (&mut paths.next, "next", pair.next),
            ] {
                let path = self.path_for(pair.frame_number, suffix);
                *slot = Some(path.clone());
                frame.save(&path)?;
            }
        }

        let composite = self.render_composite(pair);
        let path = self.path_for(pair.frame_number, "xai");
        paths.heatmap = Some(path.clone());
        composite.save(&path)
    }

    /// Top: previous and synthesized frame. Bottom: flow magnitude and edge density.
    pub fn render_composite(&self, pair: &PairView) -> RgbImage {
        let (width, height) = pair.prev.dimensions();
        let m = pair.metrics;

        let quadrants = [
            (pair.prev.clone(), m.occlusion_risk / OCCLUSION_FULL_SCALE, format!("PREV OCC={:.2}", m.occlusion_risk)),
            (pair.synthesized.clone(), m.temporal_consistency, format!("INTERP TC={:.2}", m.temporal_consistency)),
            (
                flow_map(pair.flow, width, height),
                m.motion_complexity / MOTION_FULL_SCALE,
                format!("FLOW MC={:.2}", m.motion_complexity),
            ),
            (
                edge_density_map(&to_grayscale(pair.synthesized)),
                m.edge_preservation / EDGE_FULL_SCALE,
                format!("EDGES EP={:.2}", m.edge_preservation),
            ),
        ];

        let color = verdict_color(pair.verdict);
        let mut composite = RgbImage::new(width * 2, height * 2);
        for (i, (mut quadrant, fill, label)) in quadrants.into_iter().enumerate() {
            draw_gauge(&mut quadrant, fill, color);
            draw_label(&mut quadrant, &label, gauge_height(height));
            let x = (i % 2) as i64 * width as i64;
            let y = (i / 2) as i64 * height as i64;
            image::imageops::replace(&mut composite, &quadrant, x, y);
        }
        composite
    }
}

fn verdict_color(verdict: Verdict) -> Rgb<u8> {
    match verdict {
        Verdict::Pass => Rgb([40, 200, 60]),
        Verdict::Warning => Rgb([255, 160, 0]),
        Verdict::Fail => Rgb([220, 30, 30]),
    }
}

fn gauge_height(image_height: u32) -> u32 {
    (image_height / 24).max(4).min(image_height)
}

/// Strip along the top edge, filled proportionally to `fill` (clamped to 0..1)
fn draw_gauge(image: &mut RgbImage, fill: f64, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    let strip = gauge_height(height);
    if width == 0 || strip == 0 {
        return;
    }
    draw_filled_rect_mut(image, Rect::at(0, 0).of_size(width, strip), Rgb([20, 20, 20]));
    let filled = (fill.clamp(0.0, 1.0) * width as f64).round() as u32;
    if filled > 0 {
        draw_filled_rect_mut(image, Rect::at(0, 0).of_size(filled, strip), color);
    }
}

/// 8×8 bitmap text on a dark box at the left edge, starting `top` pixels down.
/// Glyphs are doubled on frames 240 pixels or taller. Skipped if the box does not fit.
fn draw_label(image: &mut RgbImage, text: &str, top: u32) {
    let scale = if image.height() >= 240 { 2 } else { 1 };
    let glyph = 8 * scale;
    let box_height = glyph + 4;
    if image.width() < glyph + 4 || image.height() < top + box_height {
        return;
    }
    let box_width = (text.chars().count() as u32 * glyph + 4).min(image.width());
    draw_filled_rect_mut(image, Rect::at(0, top as i32).of_size(box_width, box_height), LABEL_BACKGROUND);

    for (i, c) in text.chars().enumerate() {
        let x0 = 2 + i as u32 * glyph;
        if x0 + glyph > image.width() {
            break;
        }
        let Some(rows) = BASIC_FONTS.get(c) else { continue };
        for (row, bits) in rows.into_iter().enumerate() {
            // Least significant bit is the leftmost pixel
            for col in (0..8u32).filter(|&col| bits & (1u8 << col) != 0) {
                for dy in 0..scale {
                    for dx in 0..scale {
                        let x = x0 + col * scale + dx;
                        let y = top + 2 + row as u32 * scale + dy;
                        image.put_pixel(x, y, LABEL_COLOR);
                    }
                }
            }
        }
    }
}

fn flow_map(flow: Option<&FlowField>, width: u32, height: u32) -> RgbImage {
    let Some(flow) = flow else { return RgbImage::from_pixel(width, height, viridis(0.0)) };
    let max = flow.magnitudes().fold(0.0f32, f32::max);
    RgbImage::from_fn(width, height, |x, y| {
        let value = if max > 0.0 { flow.magnitude_at(x, y) / max } else { 0.0 };
        viridis(value)
    })
}

fn edge_density_map(gray: &GrayImage) -> RgbImage {
    let blurred = gaussian_blur_f32(&edge_map(gray), EDGE_BLUR_SIGMA);
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| jet(blurred.get_pixel(x, y).0[0] as f32 / 255.0))
}

fn lerp_rgb(a: [f32; 3], b: [f32; 3], t: f32) -> Rgb<u8> {
    Rgb(std::array::from_fn(|i| (a[i] + (b[i] - a[i]) * t).round().clamp(0.0, 255.0) as u8))
}

/// Piecewise-linear viridis, `t` in 0..=1
fn viridis(t: f32) -> Rgb<u8> {
    const STOPS: [[f32; 3]; 5] = [
        [68.0, 1.0, 84.0],
        [59.0, 82.0, 139.0],
        [33.0, 145.0, 140.0],
        [94.0, 201.0, 98.0],
        [253.0, 231.0, 37.0],
    ];
    let scaled = t.clamp(0.0, 1.0) * (STOPS.len() - 1) as f32;
    let i = (scaled.floor() as usize).min(STOPS.len() - 2);
    lerp_rgb(STOPS[i], STOPS[i + 1], scaled - i as f32)
}

/// Classic jet, dark blue through red
fn jet(t: f32) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let channel = |offset: f32| ((1.5 - (4.0 * t - offset).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(seed: u32) -> Frame {
        RgbImage::from_fn(32, 24, |x, y| {
            let v = ((x / 4 + y / 4 + seed) % 2 * 180 + 30) as u8;
            Rgb([v, v, v])
        })
    }

    fn pair<'a>(frame_number: usize, f: &'a Frame, metrics: &'a Metrics, verdict: Verdict) -> PairView<'a> {
        PairView { frame_number, prev: f, next: f, synthesized: f, metrics, flow: None, verdict }
    }

    #[test]
    fn interval_policy() {
        let policy = DebugPolicy::Interval(3);
        let emitted: Vec<usize> = (0..10).filter(|i| policy.should_emit(*i, Verdict::Pass)).collect();
        assert_eq!(emitted, vec![0, 3, 6, 9]);
    }

    #[test]
    fn on_issue_policy() {
        let policy = DebugPolicy::OnIssue;
        assert!(!policy.should_emit(0, Verdict::Pass));
        assert!(policy.should_emit(1, Verdict::Warning));
        assert!(policy.should_emit(2, Verdict::Fail));
        assert!(!DebugPolicy::Off.should_emit(0, Verdict::Fail));
    }

    #[test]
    fn parse_policy() {
        assert_eq!("off".parse::<DebugPolicy>().unwrap(), DebugPolicy::Off);
        assert_eq!("On-Issue".parse::<DebugPolicy>().unwrap(), DebugPolicy::OnIssue);
        assert_eq!("interval:5".parse::<DebugPolicy>().unwrap(), DebugPolicy::Interval(5));
        assert_eq!("interval 2".parse::<DebugPolicy>().unwrap(), DebugPolicy::Interval(2));
        assert_eq!("4".parse::<DebugPolicy>().unwrap(), DebugPolicy::Interval(4));
        assert!("interval:0".parse::<DebugPolicy>().is_err());
        assert!("sometimes".parse::<DebugPolicy>().is_err());
    }

    #[test]
    fn emits_composite_and_raw_frames() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = DebugArtifactEmitter::new(dir.path(), true);
        let f = frame(0);
        let metrics = Metrics { temporal_consistency: 1.0, edge_preservation: 1.0, ..Default::default() };
        let paths = emitter.emit(&pair(7, &f, &metrics, Verdict::Pass));

        assert_eq!(paths.heatmap, Some(dir.path().join("frame_7_xai.jpg")));
        assert_eq!(paths.prev, Some(dir.path().join("frame_7_prev.jpg")));
        assert!(paths.all().all(|p| p.is_file()));
        let composite = image::open(paths.heatmap.unwrap()).unwrap();
        assert_eq!((composite.width(), composite.height()), (64, 48));
    }

    #[test]
    fn composite_only_without_raw_frames() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = DebugArtifactEmitter::new(dir.path(), false);
        let f = frame(1);
        let paths = emitter.emit(&pair(0, &f, &Metrics::default(), Verdict::Fail));
        assert!(paths.prev.is_none() && paths.interp.is_none() && paths.next.is_none());
        assert!(paths.heatmap.is_some());
    }

    #[test]
    fn failure_yields_no_paths() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the directory should be
        let blocked = dir.path().join("blocked");
        fs::write(&blocked, b"").unwrap();
        let emitter = DebugArtifactEmitter::new(&blocked, true);
        let f = frame(2);
        let paths = emitter.emit(&pair(3, &f, &Metrics::default(), Verdict::Warning));
        assert!(paths.is_empty());
    }

    #[test]
    fn gauge_fills_proportionally() {
        let mut image = RgbImage::new(100, 48);
        let color = verdict_color(Verdict::Warning);
        draw_gauge(&mut image, 0.25, color);
        assert_eq!(image.get_pixel(10, 0), &color);
        assert_eq!(image.get_pixel(30, 0), &Rgb([20, 20, 20]));
        assert_eq!(image.get_pixel(30, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn label_draws_white_glyphs_on_dark_box() {
        let mut image = RgbImage::from_pixel(100, 48, Rgb([90, 90, 90]));
        draw_label(&mut image, "A", 4);
        // Top row of 'A' covers columns 2 and 3 of the glyph
        assert_eq!(image.get_pixel(4, 6), &LABEL_COLOR);
        assert_eq!(image.get_pixel(2, 6), &LABEL_BACKGROUND);
        assert_eq!(image.get_pixel(50, 6), &Rgb([90, 90, 90]));
        assert_eq!(image.get_pixel(4, 2), &Rgb([90, 90, 90]));
    }

    #[test]
    fn label_is_skipped_when_it_does_not_fit() {
        let mut image = RgbImage::from_pixel(20, 10, Rgb([90, 90, 90]));
        draw_label(&mut image, "PREV", 4);
        assert!(image.pixels().all(|p| *p == Rgb([90, 90, 90])));
    }

    #[test]
    fn composite_labels_every_quadrant() {
        let prev = frame(0);
        let next = frame(1);
        let metrics = Metrics { motion_complexity: 3.5, temporal_consistency: 0.8, ..Default::default() };
        let flow = crate::detect::flow::estimate_flow(&to_grayscale(&prev), &to_grayscale(&next), 640);
        let view = PairView {
            frame_number: 0,
            prev: &prev,
            next: &next,
            synthesized: &prev,
            metrics: &metrics,
            flow: Some(&flow),
            verdict: Verdict::Warning,
        };
        let composite = DebugArtifactEmitter::new("unused", false).render_composite(&view);
        assert_eq!(composite.dimensions(), (64, 48));
        // First glyphs are P, I, F and E, all of which set column 2 of their top row
        for (x, y) in [(0, 0), (32, 0), (0, 24), (32, 24)] {
            assert_eq!(composite.get_pixel(x + 4, y + 6), &LABEL_COLOR);
        }
    }

    #[test]
    fn missing_flow_renders_flat_map() {
        let map = flow_map(None, 8, 6);
        assert!(map.pixels().all(|p| *p == viridis(0.0)));
    }

    #[test]
    fn colormap_endpoints() {
        assert_eq!(viridis(0.0), Rgb([68, 1, 84]));
        assert_eq!(viridis(1.0), Rgb([253, 231, 37]));
        assert_eq!(jet(0.0), Rgb([0, 0, 128]));
        assert_eq!(jet(1.0), Rgb([128, 0, 0]));
    }
}
