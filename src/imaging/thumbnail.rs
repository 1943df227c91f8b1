//! Bounded-size preview images.

use std::path::Path;

use image::imageops::FilterType;

use super::codec::{self, THUMBNAIL_JPEG_QUALITY};
use super::resize;
use crate::error::EnhanceError;

/// Default thumbnail bounds (width, height).
pub const DEFAULT_THUMBNAIL_SIZE: (u32, u32) = (400, 300);

/// Generates thumbnails next to uploaded files.
///
/// Thumbnails are always fully regenerated from the current source, so a
/// stale preview is fixed by simply calling [`generate`](Self::generate)
/// again.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailGenerator {
    max_size: (u32, u32),
    quality: u8,
}

impl Default for ThumbnailGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_THUMBNAIL_SIZE)
    }
}

impl ThumbnailGenerator {
    pub fn new(max_size: (u32, u32)) -> Self {
        Self {
            max_size,
            quality: THUMBNAIL_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = codec::clamp_quality(quality);
        self
    }

    /// Write a thumbnail of `src` to `dest`.
    ///
    /// Never fails: a corrupt or unsupported source leaves `dest` absent (or
    /// as it was) and is only logged.
    pub fn generate(&self, src: &Path, dest: &Path) {
        if let Err(e) = self.try_generate(src, dest) {
            tracing::debug!(
                "Thumbnail for {} not generated: {}",
                src.display(),
                e
            );
        }
    }

    /// Fallible variant of [`generate`](Self::generate).
    ///
    /// Returns the dimensions of the written thumbnail.
    pub fn try_generate(&self, src: &Path, dest: &Path) -> Result<(u32, u32), EnhanceError> {
        let (_, img) = codec::decode_file(src)?;
        let (thumb, _) = resize::downscale(img, self.max_size, FilterType::Triangle);
        codec::save(&thumb, dest, self.quality)?;
        Ok((thumb.width(), thumb.height()))
    }
}
