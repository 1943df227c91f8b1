//! Test utilities for integration tests.
//!
//! Helpers for building an isolated uploads tree, writing test images and
//! encoding multipart request bodies.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

use portfolio_server::error::EnhanceError;
use portfolio_server::imaging::{TextBox, TextDetector};
use portfolio_server::processing::{task_queue, TaskReceiver};
use portfolio_server::{
    AdvancedEnhancer, AppState, BroadcastHub, ProcessingWorker, TaskQueue, ThumbnailGenerator,
    UploadLayout, VisionCapabilities,
};

pub const BOUNDARY: &str = "portfolio-test-boundary";

// =============================================================================
// Test Environment
// =============================================================================

/// An uploads tree in a temporary directory plus the shared components.
pub struct TestEnv {
    // Held so the directory lives as long as the environment
    _dir: TempDir,
    pub layout: UploadLayout,
    pub hub: BroadcastHub,
    pub queue: TaskQueue,
    pub receiver: Option<TaskReceiver>,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let layout = UploadLayout::new(dir.path().join("uploads"));
        layout.ensure_dirs().expect("create uploads dirs");
        let (queue, receiver) = task_queue();

        Self {
            _dir: dir,
            layout,
            hub: BroadcastHub::new(),
            queue,
            receiver: Some(receiver),
        }
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.hub.clone(), self.queue.clone(), self.layout.clone())
    }

    pub fn upload_path(&self, name: &str) -> PathBuf {
        self.layout.uploads_dir().join(name)
    }

    /// Worker with deep vision and no OCR.
    pub fn worker(&self) -> ProcessingWorker {
        self.worker_with(VisionCapabilities::deep_vision())
    }

    pub fn worker_with(&self, capabilities: VisionCapabilities) -> ProcessingWorker {
        ProcessingWorker::new(
            AdvancedEnhancer::new(capabilities),
            ThumbnailGenerator::default(),
            self.layout.clone(),
            self.hub.clone(),
        )
    }

    pub fn take_receiver(&mut self) -> TaskReceiver {
        self.receiver.take().expect("receiver already taken")
    }
}

// =============================================================================
// Images
// =============================================================================

/// A patterned RGB image, so resizing and enhancement have something to do.
pub fn test_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let v = ((x / 8 + y / 8) % 2) as u8 * 120 + 60;
        Rgb([v, (x % 256) as u8, (y % 256) as u8])
    })
}

pub fn write_image(path: &Path, width: u32, height: u32) {
    DynamicImage::ImageRgb8(test_image(width, height))
        .save(path)
        .expect("write test image");
}

pub fn encode_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(test_image(width, height))
        .write_to(&mut Cursor::new(&mut out), format)
        .expect("encode test image");
    out
}

pub fn dimensions(path: &Path) -> (u32, u32) {
    let img = image::open(path).expect("open image");
    (img.width(), img.height())
}

// =============================================================================
// Multipart Bodies
// =============================================================================

/// One multipart field: `(name, filename, content)`.
pub type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n",
                    name, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

// =============================================================================
// Text Detectors
// =============================================================================

/// Returns the same boxes for every image.
pub struct FixedDetector(pub Vec<TextBox>);

impl TextDetector for FixedDetector {
    fn name(&self) -> &str {
        "fixed"
    }

    fn detect(&self, _image: &RgbImage) -> Result<Vec<TextBox>, EnhanceError> {
        Ok(self.0.clone())
    }
}

/// Panics on every call.
pub struct PanickingDetector;

impl TextDetector for PanickingDetector {
    fn name(&self) -> &str {
        "panicking"
    }

    fn detect(&self, _image: &RgbImage) -> Result<Vec<TextBox>, EnhanceError> {
        panic!("detector blew up")
    }
}

pub fn with_detector(detector: impl TextDetector + 'static) -> VisionCapabilities {
    VisionCapabilities::deep_vision().with_text_detector(Arc::new(detector))
}
