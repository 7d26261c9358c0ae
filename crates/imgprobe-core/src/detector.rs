//! Haar cascade face-box detector.
//!
//! Scans an image pyramid with the cascade's base window, normalising each
//! window by its pixel variance, then merges the hits by neighbour voting.

use crate::cascade::{Cascade, CascadeError, Verdict};
use crate::frame::{resize_bilinear, Frame};
use crate::grouping::{group_rectangles, GROUP_EPS};
use crate::integral::IntegralImage;
use crate::types::{DetectionResult, Rect};
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
pub const DEFAULT_SCALE_FACTOR: f64 = 1.2;
pub const DEFAULT_MIN_NEIGHBORS: usize = 5;
pub const DEFAULT_MIN_SIZE: (u32, u32) = (30, 30);
/// Windows whose pixel standard deviation does not exceed this are skipped.
const MIN_WINDOW_STDDEV: f64 = 10.0;
/// Above this scale the pyramid is coarse enough to scan every position.
const DENSE_SCAN_FACTOR: f64 = 2.0;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error(transparent)]
    Cascade(#[from] CascadeError),
    #[error("invalid detection parameters: {0}")]
    InvalidParams(String),
    #[error("grayscale buffer has {actual} bytes, expected {expected}")]
    InvalidFrame { expected: usize, actual: usize },
}

/// Multi-scale scan configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectParams {
    /// Ratio between consecutive pyramid levels; must exceed 1.
    pub scale_factor: f64,
    /// A box needs more than this many overlapping window hits to be kept.
    pub min_neighbors: usize,
    pub min_size: (u32, u32),
    /// Largest box to look for; the whole image when `None`.
    pub max_size: Option<(u32, u32)>,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: DEFAULT_MIN_SIZE,
            max_size: None,
        }
    }
}

impl DetectParams {
    fn validate(&self) -> Result<(), DetectorError> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 1.0 {
            return Err(DetectorError::InvalidParams(format!(
                "scale factor must be greater than 1, got {}",
                self.scale_factor
            )));
        }
        Ok(())
    }
}

/// One pyramid level: the image is shrunk by `factor` and scanned with the base window.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScaleLevel {
    factor: f64,
    /// Base window size mapped back to original pixels.
    window: (u32, u32),
    scaled: (usize, usize),
}

/// Cascade-based face-box detector.
pub struct CascadeDetector {
    cascade: Cascade,
}

impl CascadeDetector {
    /// Load a cascade classifier file.
    pub fn load(path: &Path) -> Result<Self, DetectorError> {
        Ok(Self::new(Cascade::load(path)?))
    }

    pub fn new(cascade: Cascade) -> Self {
        Self { cascade }
    }

    /// Detect objects in a decoded image and report them with its dimensions.
    pub fn detect_frame(
        &self,
        frame: &Frame,
        params: &DetectParams,
    ) -> Result<DetectionResult, DetectorError> {
        let gray = frame.to_grayscale();
        let boxes = self.detect(&gray, frame.width(), frame.height(), params)?;

        Ok(DetectionResult {
            h: frame.height(),
            w: frame.width(),
            channels: frame.channels(),
            boxes,
        })
    }

    /// Detect objects in a row-major grayscale buffer of `width` × `height` bytes.
    ///
    /// Boxes come back in cluster order and always lie inside the image.
    pub fn detect(
        &self,
        gray: &[u8],
        width: u32,
        height: u32,
        params: &DetectParams,
    ) -> Result<Vec<Rect>, DetectorError> {
        params.validate()?;
        let expected = width as usize * height as usize;
        if gray.len() != expected {
            return Err(DetectorError::InvalidFrame {
                expected,
                actual: gray.len(),
            });
        }

        let levels = self.scale_levels(width, height, params);
        let mut candidates = Vec::new();

        for level in &levels {
            let before = candidates.len();
            self.scan_level(gray, width as usize, height as usize, level, &mut candidates);
            tracing::debug!(
                factor = level.factor,
                window = ?level.window,
                scaled = ?level.scaled,
                hits = candidates.len() - before,
                "scanned pyramid level"
            );
        }

        let boxes: Vec<Rect> = group_rectangles(&candidates, params.min_neighbors, GROUP_EPS)
            .into_iter()
            .map(|r| r.clamp_to(width, height))
            .collect();

        tracing::info!(
            levels = levels.len(),
            candidates = candidates.len(),
            boxes = boxes.len(),
            "cascade detection complete"
        );

        Ok(boxes)
    }

    /// Pyramid levels to scan, smallest window first.
    fn scale_levels(&self, width: u32, height: u32, params: &DetectParams) -> Vec<ScaleLevel> {
        let (win_w, win_h) = (self.cascade.window_width, self.cascade.window_height);
        let (max_w, max_h) = params.max_size.unwrap_or((width, height));
        let (min_w, min_h) = params.min_size;

        let mut levels = Vec::new();
        let mut factor = 1.0f64;
        loop {
            let window = (
                (win_w as f64 * factor).round_ties_even() as u32,
                (win_h as f64 * factor).round_ties_even() as u32,
            );
            let scaled = (
                (width as f64 / factor).round_ties_even() as usize,
                (height as f64 / factor).round_ties_even() as usize,
            );

            if scaled.0 <= win_w || scaled.1 <= win_h {
                break;
            }
            if window.0 > max_w || window.1 > max_h {
                break;
            }
            if window.0 >= min_w && window.1 >= min_h {
                levels.push(ScaleLevel { factor, window, scaled });
            }

            factor *= params.scale_factor;
        }

        levels
    }

    fn scan_level(
        &self,
        gray: &[u8],
        width: usize,
        height: usize,
        level: &ScaleLevel,
        candidates: &mut Vec<Rect>,
    ) {
        let (sw, sh) = level.scaled;
        let resized;
        let plane: &[u8] = if (sw, sh) == (width, height) {
            gray
        } else {
            resized = resize_bilinear(gray, width, height, sw, sh);
            &resized
        };
        let ii = IntegralImage::new(plane, sw, sh);

        let step = if level.factor > DENSE_SCAN_FACTOR { 1 } else { 2 };
        let range_x = sw - self.cascade.window_width;
        let range_y = sh - self.cascade.window_height;

        for y in (0..range_y).step_by(step) {
            let mut x = 0;
            while x < range_x {
                match self.evaluate_window(&ii, x, y) {
                    Some(Verdict::Accepted) => candidates.push(Rect::new(
                        (x as f64 * level.factor).round_ties_even() as u32,
                        (y as f64 * level.factor).round_ties_even() as u32,
                        level.window.0,
                        level.window.1,
                    )),
                    // Rejected outright: the neighbouring position is unlikely to pass either.
                    Some(Verdict::Rejected { stage: 0 }) => x += step,
                    _ => {}
                }
                x += step;
            }
        }
    }

    /// Classify the base window at `(x, y)`; `None` for windows too flat to judge.
    fn evaluate_window(&self, ii: &IntegralImage, x: usize, y: usize) -> Option<Verdict> {
        let (nw, nh) = (self.cascade.window_width - 2, self.cascade.window_height - 2);
        let area = (nw * nh) as f64;
        let sum = ii.rect_sum(x + 1, y + 1, nw, nh) as f64;
        let sqsum = ii.rect_sqsum(x + 1, y + 1, nw, nh) as f64;

        // area² · variance
        let nf = area * sqsum - sum * sum;
        if nf <= 0.0 {
            return None;
        }
        let nf = nf.sqrt();
        if nf / area <= MIN_WINDOW_STDDEV {
            return None;
        }

        let norm = (1.0 / nf) as f32;
        Some(
            self.cascade
                .classify(|f| self.cascade.features[f].response(ii, x, y) * norm),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::EDGE_CASCADE_XML;
    use image::{Rgb, RgbImage};

    fn edge_detector() -> CascadeDetector {
        CascadeDetector::new(Cascade::parse(EDGE_CASCADE_XML).unwrap())
    }

    /// `size`² image, background 128, with a dark-over-bright block at `[lo, hi)²`.
    fn edge_scene(size: usize, lo: usize, hi: usize) -> Vec<u8> {
        let mid = (lo + hi) / 2;
        let mut gray = vec![128u8; size * size];
        for y in lo..hi {
            for x in lo..hi {
                gray[y * size + x] = if y < mid { 0 } else { 255 };
            }
        }
        gray
    }

    fn rows(top: u8, bottom: u8) -> Vec<u8> {
        (0..24 * 24).map(|i| if i < 12 * 24 { top } else { bottom }).collect()
    }

    #[test]
    fn test_window_accepts_edge() {
        let det = edge_detector();
        let ii = IntegralImage::new(&rows(0, 255), 24, 24);
        assert_eq!(det.evaluate_window(&ii, 0, 0), Some(Verdict::Accepted));
    }

    #[test]
    fn test_window_rejects_inverted_edge() {
        let det = edge_detector();
        let ii = IntegralImage::new(&rows(255, 0), 24, 24);
        assert_eq!(det.evaluate_window(&ii, 0, 0), Some(Verdict::Rejected { stage: 0 }));
    }

    #[test]
    fn test_window_skips_flat_and_low_contrast() {
        let det = edge_detector();
        let ii = IntegralImage::new(&vec![128u8; 24 * 24], 24, 24);
        assert_eq!(det.evaluate_window(&ii, 0, 0), None);

        // Alternating rows of 100 and 110: standard deviation 5.
        let stripes: Vec<u8> = (0..24 * 24).map(|i| if (i / 24) % 2 == 0 { 100 } else { 110 }).collect();
        let ii = IntegralImage::new(&stripes, 24, 24);
        assert_eq!(det.evaluate_window(&ii, 0, 0), None);
    }

    #[test]
    fn test_scale_levels_640x480() {
        let det = edge_detector();
        let levels = det.scale_levels(640, 480, &DetectParams::default());

        // 24 and 29 px windows are below the 30 px minimum.
        assert_eq!(levels[0].window, (35, 35));
        assert!((levels[0].factor - 1.44).abs() < 1e-9);
        assert_eq!(levels.len(), 15);
        assert!(levels.iter().all(|l| l.scaled.0 > 24 && l.scaled.1 > 24));
        assert!(levels.windows(2).all(|w| w[0].window.0 < w[1].window.0));
    }

    #[test]
    fn test_scale_levels_round_halves_to_even() {
        let det = edge_detector();
        let params = DetectParams { scale_factor: 2.0, min_size: (0, 0), ..DetectParams::default() };
        let levels = det.scale_levels(101, 103, &params);
        assert_eq!(levels.len(), 3);
        // 50.5 -> 50, 51.5 -> 52
        assert_eq!(levels[1].scaled, (50, 52));
        assert_eq!(levels[1].window, (48, 48));
    }

    #[test]
    fn test_scale_levels_respect_max_size() {
        let det = edge_detector();
        let params = DetectParams { max_size: Some((60, 60)), ..DetectParams::default() };
        let levels = det.scale_levels(640, 480, &params);
        assert!(!levels.is_empty());
        assert!(levels.iter().all(|l| l.window.0 <= 60));
    }

    #[test]
    fn test_detect_finds_edge_block() {
        let det = edge_detector();
        let gray = edge_scene(120, 30, 90);
        let boxes = det.detect(&gray, 120, 120, &DetectParams::default()).unwrap();

        assert!(!boxes.is_empty(), "expected at least one box");
        for b in &boxes {
            assert!(b.x + b.w <= 120 && b.y + b.h <= 120, "{b:?} escapes the image");
            assert!(b.w >= 30 && b.h >= 30, "{b:?} is below min size");
            // Every contributing window overlapped the block, so the average does too.
            let slack = 6;
            assert!(b.x < 90 + slack && b.x + b.w + slack > 30, "{b:?} misses the block");
            assert!(b.y < 90 + slack && b.y + b.h + slack > 30, "{b:?} misses the block");
        }
    }

    #[test]
    fn test_raw_candidates_outnumber_grouped() {
        let det = edge_detector();
        let gray = edge_scene(120, 30, 90);
        let raw_params = DetectParams { min_neighbors: 0, ..DetectParams::default() };
        let raw = det.detect(&gray, 120, 120, &raw_params).unwrap();
        let grouped = det.detect(&gray, 120, 120, &DetectParams::default()).unwrap();
        assert!(raw.len() > grouped.len());
        assert!(raw.iter().all(|b| b.x + b.w <= 120 && b.y + b.h <= 120));
    }

    #[test]
    fn test_detect_is_deterministic() {
        let det = edge_detector();
        let gray = edge_scene(150, 20, 110);
        let a = det.detect(&gray, 150, 150, &DetectParams::default()).unwrap();
        let b = det.detect(&gray, 150, 150, &DetectParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_detect_uniform_image_has_no_boxes() {
        let det = edge_detector();
        let gray = vec![77u8; 100 * 80];
        let params = DetectParams { min_neighbors: 0, ..DetectParams::default() };
        assert!(det.detect(&gray, 100, 80, &params).unwrap().is_empty());
    }

    #[test]
    fn test_detect_image_smaller_than_window() {
        let det = edge_detector();
        let gray = rows(0, 255);
        assert!(det.detect(&gray, 24, 24, &DetectParams::default()).unwrap().is_empty());
    }

    #[test]
    fn test_detect_rejects_bad_scale_factor() {
        let det = edge_detector();
        let params = DetectParams { scale_factor: 1.0, ..DetectParams::default() };
        let err = det.detect(&[0u8; 4], 2, 2, &params).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidParams(_)));
    }

    #[test]
    fn test_detect_rejects_short_buffer() {
        let det = edge_detector();
        let err = det.detect(&[0u8; 10], 4, 4, &DetectParams::default()).unwrap_err();
        assert!(matches!(err, DetectorError::InvalidFrame { expected: 16, actual: 10 }));
    }

    #[test]
    fn test_detect_frame_reports_dimensions() {
        let det = edge_detector();
        let mut img = RgbImage::from_pixel(160, 100, Rgb([128, 128, 128]));
        for y in 20..80 {
            for x in 50..110 {
                let v = if y < 50 { 0 } else { 255 };
                img.put_pixel(x, y, Rgb([v, v, v]));
            }
        }
        let frame = Frame::from_rgb(img).unwrap();
        let result = det.detect_frame(&frame, &DetectParams::default()).unwrap();

        assert_eq!((result.h, result.w, result.channels), (100, 160, 3));
        assert!(!result.boxes.is_empty());
    }

    #[test]
    fn test_load_missing_cascade() {
        let err = CascadeDetector::load(Path::new("/nonexistent/cascade.xml"))
            .err()
            .unwrap();
        assert!(matches!(err, DetectorError::Cascade(CascadeError::NotFound(_))));
    }
}
