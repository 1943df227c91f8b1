//! Image processing for uploaded files.
//!
//! Three independent transformations operate on files in the uploads
//! directory. None of them ever returns an error to its caller; each stage
//! is recorded in an [`EnhanceReport`] and the file is left as it was when
//! nothing can be done.
//!
//! # Where each one runs
//!
//! ```text
//!   POST /api/upload
//!          │
//!          ▼
//! ┌──────────────────┐     ┌────────────────────┐
//! │   FastEnhancer   │────▶│ ThumbnailGenerator │   request path
//! │ (orient, resize, │     │   (≤ 400x300)      │   (spawn_blocking)
//! │  contrast, sharp)│     └─────────┬──────────┘
//! └──────────────────┘               │ enqueue
//!                                    ▼
//!                        ┌──────────────────────┐
//!                        │   AdvancedEnhancer   │   processing worker
//!                        │ (denoise, deskew,    │   (dedicated thread)
//!                        │  text crop)          │
//!                        └──────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`ThumbnailGenerator`]: bounded previews, regenerated from scratch each time
//! - [`FastEnhancer`]: cheap normalization run before the upload responds
//! - [`AdvancedEnhancer`]: slow, capability-gated processing
//! - [`TextDetector`]: seam for OCR engines, with [`TesseractCli`] as the adapter

pub mod advanced;
pub mod codec;
pub mod fast;
pub mod ocr;
pub mod report;
pub mod resize;
pub mod thumbnail;

pub use advanced::{AdvancedEnhancer, VisionCapabilities};
pub use codec::{
    clamp_quality, is_valid_quality, ADVANCED_JPEG_QUALITY, FAST_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY, THUMBNAIL_JPEG_QUALITY,
};
pub use fast::{FastEnhancer, DEFAULT_ENHANCE_SIZE};
pub use ocr::{TesseractCli, TextBox, TextDetector};
pub use report::{EnhanceReport, Stage, StageOutcome};
pub use thumbnail::{ThumbnailGenerator, DEFAULT_THUMBNAIL_SIZE};
