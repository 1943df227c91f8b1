//! Synchronous, request-path image normalization.
//!
//! Runs inside the upload request, so it does nothing but decode, a handful of
//! cheap pixel passes and encode. No network, no external processes.
//!
//! ```text
//! decode → EXIF orientation → bounded resize → autocontrast → sharpen → encode
//! ```
//!
//! Each step is independent: if one fails, the next one runs on the buffer as
//! it was before the failed step.

use std::io::Cursor;
use std::path::Path;

use image::imageops::FilterType;
use image::{ColorType, DynamicImage, RgbaImage};
use imageproc::filter::gaussian_blur_f32;
use imageproc::stats::histogram;

use super::codec::{self, FAST_JPEG_QUALITY};
use super::report::{EnhanceReport, Stage};
use super::resize;
use crate::error::EnhanceError;

/// Default bound for enhanced images (width, height).
pub const DEFAULT_ENHANCE_SIZE: (u32, u32) = (2000, 2000);

/// Fraction of each histogram tail clipped by autocontrast, in percent.
pub const AUTOCONTRAST_CUTOFF_PERCENT: u64 = 1;

/// Sharpness factor; 1.0 is the identity.
pub const SHARPNESS_FACTOR: f32 = 1.05;

/// Blur radius used to build the sharpening mask.
const SHARPEN_SIGMA: f32 = 1.0;

// =============================================================================
// Orientation
// =============================================================================

/// Rotation required by an EXIF orientation value.
///
/// Only the pure rotations are handled; mirrored orientations are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationFix {
    /// Orientation 3: rotate 180 degrees.
    Rotate180,
    /// Orientation 6: rotate 270 degrees counter-clockwise (90 clockwise).
    Rotate270Ccw,
    /// Orientation 8: rotate 90 degrees counter-clockwise.
    Rotate90Ccw,
}

impl OrientationFix {
    pub fn from_exif(orientation: u32) -> Option<Self> {
        match orientation {
            3 => Some(OrientationFix::Rotate180),
            6 => Some(OrientationFix::Rotate270Ccw),
            8 => Some(OrientationFix::Rotate90Ccw),
            _ => None,
        }
    }

    pub fn apply(self, img: DynamicImage) -> DynamicImage {
        // image's rotate90/rotate270 are clockwise
        match self {
            OrientationFix::Rotate180 => img.rotate180(),
            OrientationFix::Rotate270Ccw => img.rotate90(),
            OrientationFix::Rotate90Ccw => img.rotate270(),
        }
    }
}

/// Read the EXIF orientation tag from raw file bytes.
pub fn read_exif_orientation(bytes: &[u8]) -> Option<u32> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
}

// =============================================================================
// Pixel passes
// =============================================================================

/// Per-channel autocontrast that ignores `cutoff_percent` of the darkest and
/// brightest pixels when picking the stretch range. Alpha is untouched.
///
/// Returns `None` when no channel has any range to stretch.
pub fn autocontrast(img: &RgbaImage, cutoff_percent: u64) -> Option<RgbaImage> {
    let total = img.width() as u64 * img.height() as u64;
    if total == 0 {
        return None;
    }
    let cut = total * cutoff_percent / 100;

    let histograms = histogram(img);
    let mut luts: [[u8; 256]; 3] = [[0; 256]; 3];
    let mut any_change = false;

    for (bins, lut) in histograms.channels.iter().zip(luts.iter_mut()) {
        let counts = bins.iter().map(|&n| n as u64).enumerate();
        let lo = clipped_bound(counts.clone(), cut);
        let hi = clipped_bound(counts.rev(), cut);

        match (lo, hi) {
            (Some(lo), Some(hi)) if hi > lo => {
                let scale = 255.0 / (hi - lo) as f32;
                let offset = -(lo as f32) * scale;
                for (i, v) in lut.iter_mut().enumerate() {
                    *v = (i as f32 * scale + offset).round().clamp(0.0, 255.0) as u8;
                }
                any_change |= lo > 0 || hi < 255;
            }
            _ => {
                for (i, v) in lut.iter_mut().enumerate() {
                    *v = i as u8;
                }
            }
        }
    }

    if !any_change {
        return None;
    }

    let mut out = img.clone();
    for p in out.pixels_mut() {
        for c in 0..3 {
            p[c] = luts[c][p[c] as usize];
        }
    }
    Some(out)
}

/// First histogram bin that survives after discarding `cut` samples from the
/// direction of iteration.
fn clipped_bound(bins: impl Iterator<Item = (usize, u64)>, cut: u64) -> Option<usize> {
    let mut remaining = cut;
    for (value, count) in bins {
        if count == 0 {
            continue;
        }
        if count > remaining {
            return Some(value);
        }
        remaining -= count;
    }
    None
}

/// Unsharp-mask sharpening: `out = src + (factor - 1) * (src - blur)`.
pub fn sharpen(img: &RgbaImage, factor: f32) -> RgbaImage {
    let amount = factor - 1.0;
    let blurred = gaussian_blur_f32(img, SHARPEN_SIGMA);

    let mut out = img.clone();
    for (o, (s, b)) in out.pixels_mut().zip(img.pixels().zip(blurred.pixels())) {
        for c in 0..3 {
            let sharp = s[c] as f32 + amount * (s[c] as f32 - b[c] as f32);
            o[c] = sharp.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Convert a working RGBA buffer back to the colour layout of the source.
fn restore_layout(rgba: RgbaImage, original: ColorType) -> DynamicImage {
    let img = DynamicImage::ImageRgba8(rgba);
    match original {
        ColorType::L8 | ColorType::L16 => DynamicImage::ImageLuma8(img.to_luma8()),
        ColorType::La8 | ColorType::La16 => DynamicImage::ImageLumaA8(img.to_luma_alpha8()),
        c if c.has_alpha() => img,
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

// =============================================================================
// Fast Enhancer
// =============================================================================

/// In-place normalization run synchronously on freshly uploaded images.
#[derive(Debug, Clone, Copy)]
pub struct FastEnhancer {
    max_size: (u32, u32),
    quality: u8,
}

impl Default for FastEnhancer {
    fn default() -> Self {
        Self::new(DEFAULT_ENHANCE_SIZE)
    }
}

impl FastEnhancer {
    pub fn new(max_size: (u32, u32)) -> Self {
        Self {
            max_size,
            quality: FAST_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = codec::clamp_quality(quality);
        self
    }

    /// Enhance the file at `path` in place.
    ///
    /// Never fails; the report says which steps took effect.
    pub fn enhance(&self, path: &Path) -> EnhanceReport {
        let mut report = EnhanceReport::new();

        let (bytes, mut img) = match codec::decode_file(path) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!("Fast enhance skipped for {}: {}", path.display(), e);
                report.failed(Stage::Decode, &e);
                return report;
            }
        };
        report.applied(Stage::Decode);
        let color = img.color();

        match read_exif_orientation(&bytes).and_then(OrientationFix::from_exif) {
            Some(fix) => {
                img = fix.apply(img);
                report.applied(Stage::Orientation);
            }
            None => report.skipped(Stage::Orientation, "no rotation required"),
        }

        let (resized, changed) = resize::downscale(img, self.max_size, FilterType::Lanczos3);
        img = resized;
        if changed {
            report.applied(Stage::Resize);
        } else {
            report.skipped(Stage::Resize, "within bounds");
        }

        let mut rgba = img.to_rgba8();
        match autocontrast(&rgba, AUTOCONTRAST_CUTOFF_PERCENT) {
            Some(stretched) => {
                rgba = stretched;
                report.applied(Stage::Contrast);
            }
            None => report.skipped(Stage::Contrast, "full range already"),
        }

        if rgba.width() > 0 && rgba.height() > 0 {
            rgba = sharpen(&rgba, SHARPNESS_FACTOR);
            report.applied(Stage::Sharpen);
        } else {
            report.skipped(Stage::Sharpen, "empty image");
        }

        let out = restore_layout(rgba, color);
        match codec::save(&out, path, self.quality) {
            Ok(()) => report.applied(Stage::Encode),
            Err(e) => {
                tracing::warn!("Fast enhance could not save {}: {}", path.display(), e);
                report.failed(Stage::Encode, &e);
            }
        }

        report
    }

    /// Like [`enhance`](Self::enhance), but surfaces a decode failure.
    pub fn try_enhance(&self, path: &Path) -> Result<EnhanceReport, EnhanceError> {
        let report = self.enhance(path);
        if let Some((Stage::Decode, message)) = report.failures().next() {
            return Err(EnhanceError::Decode {
                message: message.to_string(),
            });
        }
        Ok(report)
    }
}

// =============================================================================
// Tests
// =============================================================================
