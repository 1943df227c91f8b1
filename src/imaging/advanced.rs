//! Background, best-effort deep processing of uploaded images.
//!
//! # Pipeline
//!
//! ```text
//! ┌────────┐  ┌─────────┐  ┌────────┐  ┌───────────┐  ┌────────┐  ┌────────┐
//! │ decode │─▶│ denoise │─▶│ deskew │─▶│ text crop │─▶│ resize │─▶│ encode │
//! └────────┘  └─────────┘  └────────┘  └───────────┘  └────────┘  └────────┘
//!                                        (OCR only)
//! ```
//!
//! Every stage returns a `Result`. A failing stage is recorded in the
//! [`EnhanceReport`] and the next stage runs on the unmodified buffer. The
//! whole pipeline is a silent no-op when deep vision is disabled, and a
//! panic anywhere inside it is caught and logged.
//!
//! This runs on the processing worker thread only; it is far too slow for
//! the request path.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::contrast::adaptive_threshold;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::geometry::{contour_area, min_area_rect};
use imageproc::point::Point;

use super::codec::{self, ADVANCED_JPEG_QUALITY};
use super::fast::DEFAULT_ENHANCE_SIZE;
use super::ocr::{text_crop_region, TesseractCli, TextDetector};
use super::report::{EnhanceReport, Stage};
use super::resize;
use crate::error::EnhanceError;

/// Rotations smaller than this (degrees) are not worth resampling for.
const MIN_DESKEW_DEGREES: f32 = 0.05;

/// Blur applied before thresholding (a 5x5 Gaussian kernel).
const SKEW_BLUR_SIGMA: f32 = 1.1;

/// Neighbourhood radius of the local threshold (an 11x11 block).
const SKEW_BLOCK_RADIUS: u32 = 5;

/// Bicubic kernel parameter (matches the common "cubic" resampler).
const CUBIC_A: f32 = -0.75;

// =============================================================================
// Capabilities
// =============================================================================

/// Optional processing capabilities available at runtime.
///
/// Deep vision covers denoise, deskew and the final re-encode. OCR
/// additionally enables cropping to detected text.
#[derive(Clone, Default)]
pub struct VisionCapabilities {
    deep_vision: bool,
    text_detector: Option<Arc<dyn TextDetector>>,
}

impl VisionCapabilities {
    /// No optional capabilities; the advanced enhancer does nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Deep vision without OCR.
    pub fn deep_vision() -> Self {
        Self {
            deep_vision: true,
            text_detector: None,
        }
    }

    pub fn with_text_detector(mut self, detector: Arc<dyn TextDetector>) -> Self {
        self.text_detector = Some(detector);
        self
    }

    /// Build capabilities from configuration, probing for a tesseract binary.
    pub fn detect(deep_vision: bool, tesseract: Option<&Path>) -> Self {
        if !deep_vision {
            return Self::none();
        }
        let mut caps = Self::deep_vision();
        if let Some(binary) = tesseract {
            match TesseractCli::probe(binary) {
                Some(cli) => caps = caps.with_text_detector(Arc::new(cli)),
                None => tracing::info!(
                    "OCR unavailable ({} not runnable); text cropping disabled",
                    binary.display()
                ),
            }
        }
        caps
    }

    pub fn has_deep_vision(&self) -> bool {
        self.deep_vision
    }

    pub fn has_ocr(&self) -> bool {
        self.deep_vision && self.text_detector.is_some()
    }
}

impl fmt::Debug for VisionCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionCapabilities")
            .field("deep_vision", &self.deep_vision)
            .field(
                "text_detector",
                &self.text_detector.as_ref().map(|d| d.name().to_string()),
            )
            .finish()
    }
}

// =============================================================================
// Stages
// =============================================================================

/// Colour-preserving noise reduction (3x3 per-channel median).
pub fn denoise(img: &RgbImage) -> RgbImage {
    median_filter(img, 1, 1)
}

/// Estimate the skew angle in degrees from the largest content contour.
///
/// Works on the grayscale of the decoded image, before denoising. The
/// blurred image is binarized against its local mean, so the page outline
/// survives uneven lighting.
///
/// Positive angles mean the content should be rotated counter-clockwise.
/// Returns `Ok(None)` when the content is already level.
pub fn estimate_skew(gray: &GrayImage) -> Result<Option<f32>, EnhanceError> {
    let blurred = gaussian_blur_f32(gray, SKEW_BLUR_SIGMA);
    let mask = adaptive_threshold(&blurred, SKEW_BLOCK_RADIUS);

    let contours = find_contours::<i32>(&mask);
    let largest = contours
        .iter()
        .map(|c| (contour_area(&c.points), c))
        .filter(|(area, _)| *area > 0.0)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c)
        .ok_or(EnhanceError::NoContour)?;

    let corners = min_area_rect(&largest.points);
    let angle = rect_angle(&corners);

    if angle.abs() < MIN_DESKEW_DEGREES {
        Ok(None)
    } else {
        Ok(Some(angle))
    }
}

/// Rotation angle of a rectangle given by its corners, in `[-45, 45)`.
///
/// The first edge's direction is folded into `[-90, 0)` and angles below
/// -45 are shifted by 90 so the smallest correcting rotation is chosen.
pub fn rect_angle(corners: &[Point<i32>; 4]) -> f32 {
    let dx = (corners[1].x - corners[0].x) as f32;
    let dy = (corners[1].y - corners[0].y) as f32;
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    let mut angle = dy.atan2(dx).to_degrees();
    while angle >= 0.0 {
        angle -= 90.0;
    }
    while angle < -90.0 {
        angle += 90.0;
    }
    if angle < -45.0 {
        angle += 90.0;
    }
    angle
}

/// Rotate counter-clockwise by `degrees` about the centre, keeping the
/// canvas size. Bicubic sampling; samples outside the source replicate the
/// nearest edge pixel.
pub fn rotate_replicate(img: &RgbImage, degrees: f32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = (w / 2) as f32;
    let cy = (h / 2) as f32;

    RgbImage::from_fn(w, h, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = cx + cos * dx - sin * dy;
        let sy = cy + sin * dx + cos * dy;
        sample_bicubic(img, sx, sy)
    })
}

fn cubic_weight(t: f32) -> f32 {
    let t = t.abs();
    if t <= 1.0 {
        ((CUBIC_A + 2.0) * t - (CUBIC_A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((CUBIC_A * t - 5.0 * CUBIC_A) * t + 8.0 * CUBIC_A) * t - 4.0 * CUBIC_A
    } else {
        0.0
    }
}

fn sample_bicubic(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = img.dimensions();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let mut acc = [0f32; 3];
    for j in -1..=2i64 {
        let wy = cubic_weight(fy - j as f32);
        let sy = (y0 as i64 + j).clamp(0, h as i64 - 1) as u32;
        for i in -1..=2i64 {
            let wx = cubic_weight(fx - i as f32);
            let sx = (x0 as i64 + i).clamp(0, w as i64 - 1) as u32;
            let p = img.get_pixel(sx, sy);
            let weight = wx * wy;
            for c in 0..3 {
                acc[c] += p[c] as f32 * weight;
            }
        }
    }

    Rgb([
        acc[0].round().clamp(0.0, 255.0) as u8,
        acc[1].round().clamp(0.0, 255.0) as u8,
        acc[2].round().clamp(0.0, 255.0) as u8,
    ])
}

/// Deskew stage: rotate `img` by the angle estimated from `gray`, or `None`
/// if level.
pub fn deskew(img: &RgbImage, gray: &GrayImage) -> Result<Option<RgbImage>, EnhanceError> {
    Ok(estimate_skew(gray)?.map(|angle| rotate_replicate(img, angle)))
}

/// Text crop stage: crop to the padded union of confident text tokens.
pub fn crop_to_text(
    img: &RgbImage,
    detector: &dyn TextDetector,
) -> Result<Option<RgbImage>, EnhanceError> {
    let boxes = detector.detect(img)?;
    let Some((x, y, w, h)) = text_crop_region(&boxes, img.width(), img.height()) else {
        return Ok(None);
    };
    if w == 0 || h == 0 {
        return Err(EnhanceError::EmptyRegion {
            width: w,
            height: h,
        });
    }
    Ok(Some(image::imageops::crop_imm(img, x, y, w, h).to_image()))
}

// =============================================================================
// Advanced Enhancer
// =============================================================================

/// Deep, slow, best-effort enhancement run by the processing worker.
#[derive(Debug, Clone)]
pub struct AdvancedEnhancer {
    max_size: (u32, u32),
    capabilities: VisionCapabilities,
}

impl AdvancedEnhancer {
    pub fn new(capabilities: VisionCapabilities) -> Self {
        Self {
            max_size: DEFAULT_ENHANCE_SIZE,
            capabilities,
        }
    }

    pub fn with_max_size(mut self, max_size: (u32, u32)) -> Self {
        self.max_size = max_size;
        self
    }

    /// Enhance the file at `path` in place.
    ///
    /// Never fails and never panics outward; the report says what happened.
    pub fn enhance(&self, path: &Path) -> EnhanceReport {
        if !self.capabilities.has_deep_vision() {
            let mut report = EnhanceReport::new();
            report.skipped(Stage::Decode, "deep vision unavailable");
            return report;
        }

        match catch_unwind(AssertUnwindSafe(|| self.run(path))) {
            Ok(report) => report,
            Err(_) => {
                tracing::error!("Advanced enhance panicked for {}", path.display());
                let mut report = EnhanceReport::new();
                report.failed(
                    Stage::Encode,
                    &EnhanceError::Io("processing panicked; file left as is".to_string()),
                );
                report
            }
        }
    }

    fn run(&self, path: &Path) -> EnhanceReport {
        let mut report = EnhanceReport::new();

        let mut img = match codec::decode_file(path) {
            Ok((_, decoded)) => decoded.to_rgb8(),
            Err(e) => {
                tracing::debug!("Advanced enhance skipped for {}: {}", path.display(), e);
                report.failed(Stage::Decode, &e);
                return report;
            }
        };
        report.applied(Stage::Decode);

        let gray = image::imageops::grayscale(&img);

        img = denoise(&img);
        report.applied(Stage::Denoise);

        if let Some(rotated) = report.record(Stage::Deskew, deskew(&img, &gray), "already level") {
            img = rotated;
        }

        match &self.capabilities.text_detector {
            Some(detector) => {
                let cropped = crop_to_text(&img, detector.as_ref());
                if let Some(cropped) = report.record(Stage::TextCrop, cropped, "no confident text") {
                    img = cropped;
                }
            }
            None => report.skipped(Stage::TextCrop, "OCR unavailable"),
        }

        let (resized, changed) =
            resize::downscale(DynamicImage::ImageRgb8(img), self.max_size, FilterType::Triangle);
        if changed {
            report.applied(Stage::Resize);
        } else {
            report.skipped(Stage::Resize, "within bounds");
        }

        match codec::save_with_fallback(&resized, path, ADVANCED_JPEG_QUALITY) {
            Ok(()) => report.applied(Stage::Encode),
            Err(e) => {
                tracing::warn!("Advanced enhance could not save {}: {}", path.display(), e);
                report.failed(Stage::Encode, &e);
            }
        }

        for (stage, message) in report.failures() {
            tracing::debug!("{}: stage {} failed: {}", path.display(), stage, message);
        }

        report
    }
}

// =============================================================================
// Tests
// =============================================================================
