//! Text-region detection used to crop scanned documents to their content.
//!
//! Detection sits behind the [`TextDetector`] trait. The production adapter
//! shells out to the `tesseract` executable, which may or may not be
//! installed; when it is missing the crop stage is simply skipped.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use image::{ImageFormat, RgbImage};

use crate::error::EnhanceError;

/// Tokens at or below this confidence are ignored when computing the crop.
pub const MIN_TEXT_CONFIDENCE: i32 = 30;

/// Padding added around the text union, as a fraction of its size per axis.
pub const CROP_PADDING: f64 = 0.06;

// =============================================================================
// Text Boxes
// =============================================================================

/// A recognized token's bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
    /// Recognition confidence (0-100), or -1 when the engine reports none
    pub confidence: f32,
}

impl TextBox {
    pub fn new(left: i64, top: i64, width: i64, height: i64, confidence: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
            confidence,
        }
    }

    fn is_confident(&self) -> bool {
        (self.confidence.trunc() as i32) > MIN_TEXT_CONFIDENCE
    }
}

/// Crop rectangle as `(x, y, width, height)`.
pub type CropRect = (u32, u32, u32, u32);

/// Compute the padded, clamped union of all confident boxes.
///
/// Returns `None` if no box clears the confidence threshold or the clamped
/// region is empty.
pub fn text_crop_region(boxes: &[TextBox], image_width: u32, image_height: u32) -> Option<CropRect> {
    let confident: Vec<&TextBox> = boxes.iter().filter(|b| b.is_confident()).collect();
    if confident.is_empty() {
        return None;
    }

    let x1 = confident.iter().map(|b| b.left).min()?;
    let y1 = confident.iter().map(|b| b.top).min()?;
    let x2 = confident.iter().map(|b| b.left + b.width).max()?;
    let y2 = confident.iter().map(|b| b.top + b.height).max()?;

    let pad_x = ((x2 - x1) as f64 * CROP_PADDING) as i64;
    let pad_y = ((y2 - y1) as f64 * CROP_PADDING) as i64;

    let x1 = (x1 - pad_x).max(0);
    let y1 = (y1 - pad_y).max(0);
    let x2 = (x2 + pad_x).min(image_width as i64);
    let y2 = (y2 + pad_y).min(image_height as i64);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
}

// =============================================================================
// Detector Trait
// =============================================================================

/// Finds text tokens in an image.
pub trait TextDetector: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Detect text tokens. An empty result means "no text", not an error.
    fn detect(&self, image: &RgbImage) -> Result<Vec<TextBox>, EnhanceError>;
}

// =============================================================================
// Tesseract Adapter
// =============================================================================

/// [`TextDetector`] backed by the `tesseract` command line tool.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
}

impl TesseractCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Return a detector if `binary --version` runs successfully.
    pub fn probe(binary: impl AsRef<Path>) -> Option<Self> {
        let available = Command::new(binary.as_ref())
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);

        available.then(|| Self::new(binary.as_ref()))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl TextDetector for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<TextBox>, EnhanceError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| EnhanceError::Encode {
                message: e.to_string(),
            })?;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EnhanceError::Ocr(format!("failed to start tesseract: {}", e)))?;

        // Feed stdin from another thread so a large TSV on stdout can't deadlock us
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| EnhanceError::Ocr("tesseract stdin unavailable".to_string()))?;
        let writer = std::thread::spawn(move || stdin.write_all(&png));

        let output = child
            .wait_with_output()
            .map_err(|e| EnhanceError::Ocr(format!("tesseract failed: {}", e)))?;

        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(EnhanceError::Ocr(format!("writing to tesseract: {}", e))),
            Err(_) => return Err(EnhanceError::Ocr("stdin writer panicked".to_string())),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EnhanceError::Ocr(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse tesseract's TSV output into token boxes.
///
/// Columns: `level page_num block_num par_num line_num word_num left top
/// width height conf text`. The header row and malformed rows are skipped;
/// a blank or `nan` confidence becomes -1.
pub fn parse_tsv(tsv: &str) -> Vec<TextBox> {
    tsv.lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 11 {
                return None;
            }
            let left = cols[6].trim().parse().ok()?;
            let top = cols[7].trim().parse().ok()?;
            let width = cols[8].trim().parse().ok()?;
            let height = cols[9].trim().parse().ok()?;
            let confidence = cols[10]
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|c| c.is_finite())
                .unwrap_or(-1.0);
            Some(TextBox::new(left, top, width, height, confidence))
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
