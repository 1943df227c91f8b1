//! HTTP request handlers for uploads and live updates.
//!
//! # Endpoints
//!
//! - `POST /api/upload` - Store a file, enhance and thumbnail it, queue it
//! - `GET /stream` - Text event stream of broadcast events
//! - `GET /health` - Health check endpoint

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

use crate::error::UploadError;
use crate::events::{BroadcastHub, Event};
use crate::imaging::{FastEnhancer, ThumbnailGenerator};
use crate::processing::{Task, TaskQueue};
use crate::uploads::{is_allowed, is_image, sanitize_filename, UploadLayout};

/// Category used when the upload form sends no `kind`.
pub const DEFAULT_KIND: &str = "cert";

/// First event sent on every new stream.
pub const CONNECTED_EVENT: &str = "connected";

/// Attempts at finding a free filename before giving up.
const MAX_NAME_ATTEMPTS: usize = 16;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Live-update registry
    pub hub: BroadcastHub,

    /// Handoff to the processing worker
    pub queue: TaskQueue,

    /// Where uploads and thumbnails live
    pub layout: Arc<UploadLayout>,

    /// Request-path normalization
    pub fast: FastEnhancer,

    /// Preview generation
    pub thumbnails: ThumbnailGenerator,
}

impl AppState {
    pub fn new(hub: BroadcastHub, queue: TaskQueue, layout: UploadLayout) -> Self {
        Self {
            hub,
            queue,
            layout: Arc::new(layout),
            fast: FastEnhancer::default(),
            thumbnails: ThumbnailGenerator::default(),
        }
    }

    pub fn with_fast_enhancer(mut self, fast: FastEnhancer) -> Self {
        self.fast = fast;
        self
    }

    pub fn with_thumbnails(mut self, thumbnails: ThumbnailGenerator) -> Self {
        self.thumbnails = thumbnails;
        self
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "missing_file", "invalid_file")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Successful upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub ok: bool,

    /// Public URL of the stored file
    pub url: String,

    /// Public URL of the thumbnail (images only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,

    pub kind: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert UploadError to HTTP response.
///
/// Client mistakes are logged at WARN, storage failures at ERROR.
impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            UploadError::MissingFile => (StatusCode::BAD_REQUEST, "missing_file"),
            UploadError::InvalidFile { .. } => (StatusCode::BAD_REQUEST, "invalid_file"),
            UploadError::Multipart { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
            UploadError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle file uploads.
///
/// # Endpoint
///
/// `POST /api/upload` (multipart/form-data)
///
/// # Fields
///
/// - `file`: the uploaded file (required)
/// - `kind`: category label (default: `cert`)
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {"ok": true, "url": "/uploads/x.jpg", "thumb": "/uploads/thumbs/x.jpg", "kind": "snap"}
/// ```
///
/// Images are enhanced and thumbnailed before responding and then queued
/// for background processing. Enhancement problems never fail the request.
pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, UploadError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut kind = DEFAULT_KIND.to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart {
            message: e.to_string(),
        })?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let data = field.bytes().await.map_err(|e| UploadError::Multipart {
                    message: e.to_string(),
                })?;
                file = Some((filename, data));
            }
            "kind" => {
                let text = field.text().await.map_err(|e| UploadError::Multipart {
                    message: e.to_string(),
                })?;
                let text = text.trim();
                if !text.is_empty() {
                    kind = text.to_string();
                }
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or(UploadError::MissingFile)?;
    if filename.is_empty() {
        return Err(UploadError::MissingFile);
    }

    let safe_name = sanitize_filename(&filename)
        .filter(|name| is_allowed(name))
        .ok_or_else(|| UploadError::InvalidFile {
            filename: filename.clone(),
        })?;

    let (name, path) = store_file(&state.layout, &safe_name, &data).await?;
    debug!("Stored upload {} ({} bytes, kind {})", name, data.len(), kind);

    let thumb = if is_image(&name) {
        prepare_image(&state, path.clone()).await;
        state.queue.enqueue(Task::new(path, kind.clone(), name.clone()));
        Some(state.layout.thumb_url(&name))
    } else {
        None
    };

    Ok(Json(UploadResponse {
        ok: true,
        url: state.layout.url(&name),
        thumb,
        kind,
    }))
}

/// Write `data` under a free variant of `name`.
async fn store_file(
    layout: &UploadLayout,
    name: &str,
    data: &[u8],
) -> Result<(String, PathBuf), UploadError> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        let (name, path) = layout.unique_destination(name);
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        let mut out = match opened {
            Ok(out) => out,
            // Another upload claimed the name in between
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        };
        write_or_discard(out, &path, data).await?;
        return Ok((name, path));
    }

    Err(UploadError::Io(format!("no free filename for {}", name)))
}

/// Write and flush `data`; on failure remove the partial file at `path` so
/// the name is not left claimed by a truncated upload.
async fn write_or_discard<W>(mut out: W, path: &Path, data: &[u8]) -> Result<(), UploadError>
where
    W: AsyncWrite + Unpin,
{
    let written = match out.write_all(data).await {
        Ok(()) => out.flush().await,
        Err(e) => Err(e),
    };
    drop(out);

    if let Err(e) = written {
        error!("Failed to write upload {}: {}", path.display(), e);
        if let Err(remove_err) = tokio::fs::remove_file(path).await {
            warn!("Could not remove partial upload {}: {}", path.display(), remove_err);
        }
        return Err(e.into());
    }
    Ok(())
}

/// Run the fast enhancer and first thumbnail off the async executor.
async fn prepare_image(state: &AppState, path: PathBuf) {
    let fast = state.fast;
    let thumbnails = state.thumbnails;
    let thumb_path = state.layout.thumb_path(&path);

    let result = tokio::task::spawn_blocking(move || {
        let report = fast.enhance(&path);
        for (stage, message) in report.failures() {
            debug!("Fast enhance of {}: {} failed: {}", path.display(), stage, message);
        }
        thumbnails.generate(&path, &thumb_path);
    })
    .await;

    if let Err(e) = result {
        warn!("Image preparation task failed: {}", e);
    }
}

/// Stream broadcast events to one client.
///
/// # Endpoint
///
/// `GET /stream`
///
/// Sends `connected {time}` first, then every published event. The
/// subscription is dropped, and so unregistered, when the client goes away.
pub async fn stream_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.hub.subscribe();
    debug!("Stream opened for subscriber {}", subscription.id());

    let connected = Event::new(CONNECTED_EVENT, json!({ "time": unix_time() }));
    let events = stream::iter([connected])
        .chain(subscription.into_stream())
        .map(|event| Ok(to_sse_event(&event)));

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &Event) -> SseEvent {
    SseEvent::default()
        .event(event.name.as_str())
        .data(event.data.to_string())
}

fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// =============================================================================
// Tests
// =============================================================================
