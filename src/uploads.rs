//! On-disk layout of uploaded files and their thumbnails.
//!
//! ```text
//! <uploads_dir>/
//! ├── photo.jpg          served as /uploads/photo.jpg
//! ├── resume.pdf
//! └── thumbs/
//!     └── photo.jpg      served as /uploads/thumbs/photo.jpg
//! ```
//!
//! A thumbnail always has the same filename as its source.

use std::io;
use std::path::{Path, PathBuf};

/// URL prefix under which uploads are served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// Name of the thumbnail subdirectory.
pub const THUMBS_DIR_NAME: &str = "thumbs";

/// Extensions accepted by the upload endpoint.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "tiff", "svg", "pdf", "doc", "docx",
];

/// Extensions that are treated as images (enhanced, thumbnailed, queued).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "tiff", "svg"];

// =============================================================================
// Filenames
// =============================================================================

/// Lowercased extension of `name`, without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn is_allowed(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_image(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Path separators and whitespace become `_`, anything outside
/// `[A-Za-z0-9._-]` is dropped and leading/trailing `.` and `_` are trimmed.
/// Returns `None` if nothing usable is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// =============================================================================
// Upload Layout
// =============================================================================

/// Paths and URLs for the uploads directory.
#[derive(Debug, Clone)]
pub struct UploadLayout {
    uploads_dir: PathBuf,
    thumbs_dir: PathBuf,
}

impl UploadLayout {
    pub fn new(uploads_dir: impl Into<PathBuf>) -> Self {
        let uploads_dir = uploads_dir.into();
        let thumbs_dir = uploads_dir.join(THUMBS_DIR_NAME);
        Self {
            uploads_dir,
            thumbs_dir,
        }
    }

    /// Create the uploads and thumbnail directories if missing.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.thumbs_dir)
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn thumbs_dir(&self) -> &Path {
        &self.thumbs_dir
    }

    /// Thumbnail location for a source file: same filename, thumbs directory.
    pub fn thumb_path(&self, src: &Path) -> PathBuf {
        match src.file_name() {
            Some(name) => self.thumbs_dir.join(name),
            None => self.thumbs_dir.clone(),
        }
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}/{}", UPLOADS_URL_PREFIX, name)
    }

    pub fn thumb_url(&self, name: &str) -> String {
        format!("{}/{}/{}", UPLOADS_URL_PREFIX, THUMBS_DIR_NAME, name)
    }

    /// First free `(name, path)` for an already-sanitized filename.
    ///
    /// `photo.png` becomes `photo-1.png`, `photo-2.png`, ... on collision.
    pub fn unique_destination(&self, name: &str) -> (String, PathBuf) {
        let (base, ext) = match name.rsplit_once('.') {
            Some((base, ext)) if !base.is_empty() => (base, format!(".{}", ext)),
            _ => (name, String::new()),
        };

        let mut candidate = name.to_string();
        let mut counter = 1u32;
        loop {
            let path = self.uploads_dir.join(&candidate);
            if !path.exists() {
                return (candidate, path);
            }
            candidate = format!("{}-{}{}", base, counter, ext);
            counter += 1;
        }
    }
}
