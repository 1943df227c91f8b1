//! Configuration management for the portfolio server.
//!
//! Every option can be given on the command line or through an environment
//! variable with the `PORTFOLIO_` prefix; everything has a default.
//!
//! # Example
//!
//! ```ignore
//! use portfolio_server::config::Config;
//!
//! let config = Config::parse();
//! config.validate()?;
//! println!("Listening on {}", config.bind_address());
//! ```
//!
//! # Environment Variables
//!
//! - `PORTFOLIO_HOST` - Server bind address (default: 0.0.0.0)
//! - `PORTFOLIO_PORT` - Server port (default: 5000)
//! - `PORTFOLIO_UPLOADS_DIR` - Uploads directory (default: static/uploads)
//! - `PORTFOLIO_THUMB_WIDTH` / `PORTFOLIO_THUMB_HEIGHT` - Thumbnail bounds (default: 400x300)
//! - `PORTFOLIO_THUMB_QUALITY` - Thumbnail JPEG quality (default: 85)
//! - `PORTFOLIO_ENHANCE_MAX_WIDTH` / `PORTFOLIO_ENHANCE_MAX_HEIGHT` - Enhancement bounds (default: 2000x2000)
//! - `PORTFOLIO_ENHANCE_QUALITY` - Fast enhancement JPEG quality (default: 90)
//! - `PORTFOLIO_ADVANCED_ENHANCE` - Background deep processing (default: true)
//! - `PORTFOLIO_OCR` - OCR-guided cropping (default: true)
//! - `PORTFOLIO_TESSERACT` - Tesseract executable (default: tesseract)
//! - `PORTFOLIO_MAX_UPLOAD_BYTES` - Upload body limit (default: 32MB)
//! - `PORTFOLIO_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use crate::imaging::{DEFAULT_ENHANCE_SIZE, DEFAULT_THUMBNAIL_SIZE, FAST_JPEG_QUALITY, THUMBNAIL_JPEG_QUALITY};
use crate::server::DEFAULT_MAX_UPLOAD_BYTES;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default uploads directory.
pub const DEFAULT_UPLOADS_DIR: &str = "static/uploads";

/// Default OCR executable.
pub const DEFAULT_TESSERACT: &str = "tesseract";

// =============================================================================
// CLI Arguments
// =============================================================================

/// Portfolio server - uploads, image processing and live updates.
#[derive(Parser, Debug, Clone)]
#[command(name = "portfolio-server")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "PORTFOLIO_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORTFOLIO_PORT")]
    pub port: u16,

    /// Directory where uploads are stored; thumbnails go in `thumbs/` inside it.
    #[arg(long, default_value = DEFAULT_UPLOADS_DIR, env = "PORTFOLIO_UPLOADS_DIR")]
    pub uploads_dir: PathBuf,

    /// Maximum upload request body in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "PORTFOLIO_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    // =========================================================================
    // Image Configuration
    // =========================================================================
    /// Maximum thumbnail width.
    #[arg(long, default_value_t = DEFAULT_THUMBNAIL_SIZE.0, env = "PORTFOLIO_THUMB_WIDTH")]
    pub thumb_width: u32,

    /// Maximum thumbnail height.
    #[arg(long, default_value_t = DEFAULT_THUMBNAIL_SIZE.1, env = "PORTFOLIO_THUMB_HEIGHT")]
    pub thumb_height: u32,

    /// JPEG quality for thumbnails (1-100).
    #[arg(long, default_value_t = THUMBNAIL_JPEG_QUALITY, env = "PORTFOLIO_THUMB_QUALITY")]
    pub thumb_quality: u8,

    /// Maximum width of enhanced images.
    #[arg(long, default_value_t = DEFAULT_ENHANCE_SIZE.0, env = "PORTFOLIO_ENHANCE_MAX_WIDTH")]
    pub enhance_max_width: u32,

    /// Maximum height of enhanced images.
    #[arg(long, default_value_t = DEFAULT_ENHANCE_SIZE.1, env = "PORTFOLIO_ENHANCE_MAX_HEIGHT")]
    pub enhance_max_height: u32,

    /// JPEG quality for the request-path enhancement (1-100).
    #[arg(long, default_value_t = FAST_JPEG_QUALITY, env = "PORTFOLIO_ENHANCE_QUALITY")]
    pub enhance_quality: u8,

    /// Run denoise and deskew in the background after each image upload.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "PORTFOLIO_ADVANCED_ENHANCE")]
    pub advanced_enhance: bool,

    /// Crop scanned documents to detected text (needs tesseract).
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "PORTFOLIO_OCR")]
    pub ocr: bool,

    /// Tesseract executable used for OCR.
    #[arg(long, default_value = DEFAULT_TESSERACT, env = "PORTFOLIO_TESSERACT")]
    pub tesseract: PathBuf,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "PORTFOLIO_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.uploads_dir.as_os_str().is_empty() {
            return Err("uploads_dir must not be empty".to_string());
        }

        if self.thumb_width == 0 || self.thumb_height == 0 {
            return Err("thumbnail dimensions must be greater than 0".to_string());
        }
        if self.enhance_max_width == 0 || self.enhance_max_height == 0 {
            return Err("enhancement dimensions must be greater than 0".to_string());
        }

        if self.thumb_quality == 0 || self.thumb_quality > 100 {
            return Err("thumb_quality must be between 1 and 100".to_string());
        }
        if self.enhance_quality == 0 || self.enhance_quality > 100 {
            return Err("enhance_quality must be between 1 and 100".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn thumbnail_size(&self) -> (u32, u32) {
        (self.thumb_width, self.thumb_height)
    }

    pub fn enhance_size(&self) -> (u32, u32) {
        (self.enhance_max_width, self.enhance_max_height)
    }

    /// Tesseract executable to probe, or `None` when OCR is switched off.
    pub fn ocr_binary(&self) -> Option<&Path> {
        (self.advanced_enhance && self.ocr).then_some(self.tesseract.as_path())
    }
}

// =============================================================================
// Tests
// =============================================================================
