use thiserror::Error;

/// Errors produced by a single image enhancement stage.
///
/// These never escape the enhancers: the orchestrating pipeline turns each
/// one into a skipped stage and moves on.
#[derive(Debug, Clone, Error)]
pub enum EnhanceError {
    /// Reading or writing the file on disk failed
    #[error("I/O error: {0}")]
    Io(String),

    /// The file is not a decodable image
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Encoding the working buffer failed
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// The file extension does not map to a known image codec
    #[error("Unsupported image format: {extension:?}")]
    UnsupportedFormat { extension: Option<String> },

    /// Deskew could not find a usable content contour
    #[error("No content contour found")]
    NoContour,

    /// A computed crop region has zero area
    #[error("Empty region: {width}x{height}")]
    EmptyRegion { width: u32, height: u32 },

    /// The text detector failed to run or produced unreadable output
    #[error("OCR error: {0}")]
    Ocr(String),
}

impl From<std::io::Error> for EnhanceError {
    fn from(err: std::io::Error) -> Self {
        EnhanceError::Io(err.to_string())
    }
}

impl From<image::ImageError> for EnhanceError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => EnhanceError::Io(e.to_string()),
            image::ImageError::Encoding(e) => EnhanceError::Encode {
                message: e.to_string(),
            },
            other => EnhanceError::Decode {
                message: other.to_string(),
            },
        }
    }
}

/// Errors that can occur while accepting an upload.
///
/// Enhancement problems are not represented here; only validation and
/// storage failures ever reach the HTTP caller.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// The multipart body had no `file` field
    #[error("No file provided")]
    MissingFile,

    /// The filename is empty after sanitizing or has a disallowed extension
    #[error("Invalid file: {filename}")]
    InvalidFile { filename: String },

    /// The multipart body could not be read
    #[error("Malformed upload: {message}")]
    Multipart { message: String },

    /// Saving the file failed
    #[error("Storage error: {0}")]
    Io(String),
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::Io(err.to_string())
    }
}
