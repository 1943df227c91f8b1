//! Bounded, aspect-preserving downscaling shared by every image path.

use image::imageops::FilterType;
use image::DynamicImage;

/// Scale factor that fits `(width, height)` inside `max_size`, clamped to
/// at most 1.0 so images are never enlarged.
pub fn fit_scale(width: u32, height: u32, max_size: (u32, u32)) -> f64 {
    if width == 0 || height == 0 {
        return 1.0;
    }
    let sx = max_size.0 as f64 / width as f64;
    let sy = max_size.1 as f64 / height as f64;
    sx.min(sy).min(1.0)
}

/// Target dimensions for fitting inside `max_size`, or `None` when the image
/// already fits.
///
/// Each resulting side is at least 1 pixel and never exceeds the bound.
pub fn fit_within(width: u32, height: u32, max_size: (u32, u32)) -> Option<(u32, u32)> {
    let scale = fit_scale(width, height, max_size);
    if scale >= 1.0 {
        return None;
    }
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_size.0.max(1));
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_size.1.max(1));
    Some((w, h))
}

/// Downscale an image to fit `max_size`, returning it unchanged if it fits.
pub fn downscale(img: DynamicImage, max_size: (u32, u32), filter: FilterType) -> (DynamicImage, bool) {
    match fit_within(img.width(), img.height(), max_size) {
        Some((w, h)) => (img.resize_exact(w, h, filter), true),
        None => (img, false),
    }
}
