//! Image decoding and extension-driven re-encoding.
//!
//! Every enhancer and the thumbnail generator write back through this module,
//! so the quality settings and codec selection live in one place.
//!
//! # Design Decisions
//!
//! - **Codec by extension**: The output codec is always picked from the
//!   destination file's extension, never sniffed from content. A `.jpg` that
//!   actually held PNG data is rewritten as a real JPEG.
//!
//! - **Quality only where it means something**: JPEG honours the quality
//!   setting directly; PNG maps it to the best compression level; other
//!   formats use their encoder defaults.
//!
//! - **Encode in memory, then write**: A failed encode never truncates the
//!   file on disk.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ImageFormat};

use crate::error::EnhanceError;

/// JPEG quality used for thumbnails.
pub const THUMBNAIL_JPEG_QUALITY: u8 = 85;

/// JPEG quality used by the fast, request-path enhancer.
pub const FAST_JPEG_QUALITY: u8 = 90;

/// JPEG quality used when the advanced enhancer re-encodes a file.
pub const ADVANCED_JPEG_QUALITY: u8 = 95;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Decoding
// =============================================================================

/// Read and decode an image file, guessing the format from its content.
pub fn decode_file(path: &Path) -> Result<(Vec<u8>, DynamicImage), EnhanceError> {
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Err(EnhanceError::Decode {
            message: "file is empty".to_string(),
        });
    }
    let img = image::load_from_memory(&bytes)?;
    Ok((bytes, img))
}

/// Determine the output format for a path from its extension.
pub fn format_for_path(path: &Path) -> Result<ImageFormat, EnhanceError> {
    ImageFormat::from_path(path).map_err(|_| EnhanceError::UnsupportedFormat {
        extension: path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase()),
    })
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode an image into the given format.
///
/// JPEG has no alpha channel, so images are flattened to RGB (or kept as
/// luma) before JPEG encoding.
pub fn encode(img: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, EnhanceError> {
    let quality = clamp_quality(quality);
    let mut output = Vec::new();

    match format {
        ImageFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
            let result = match img {
                DynamicImage::ImageLuma8(gray) => encoder.encode_image(gray),
                other => encoder.encode_image(&other.to_rgb8()),
            };
            result.map_err(|e| EnhanceError::Encode {
                message: e.to_string(),
            })?;
        }
        ImageFormat::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut output, CompressionType::Best, PngFilter::Adaptive);
            img.write_with_encoder(encoder)
                .map_err(|e| EnhanceError::Encode {
                    message: e.to_string(),
                })?;
        }
        other => {
            img.write_to(&mut Cursor::new(&mut output), other)
                .map_err(|e| EnhanceError::Encode {
                    message: e.to_string(),
                })?;
        }
    }

    Ok(output)
}

/// Encode an image with the codec implied by `path` and overwrite the file.
pub fn save(img: &DynamicImage, path: &Path, quality: u8) -> Result<(), EnhanceError> {
    let format = format_for_path(path)?;
    let bytes = encode(img, format, quality)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Save with the extension codec, falling back to the generic path-based
/// writer from the `image` crate if that fails.
pub fn save_with_fallback(img: &DynamicImage, path: &Path, quality: u8) -> Result<(), EnhanceError> {
    match save(img, path, quality) {
        Ok(()) => Ok(()),
        Err(primary) => {
            tracing::debug!(
                "Extension codec failed for {}: {}, trying generic writer",
                path.display(),
                primary
            );
            img.save(path).map_err(EnhanceError::from)
        }
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
