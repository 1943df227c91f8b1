//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │     POST /api/upload      GET /stream      GET /uploads/*       │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │           routes            │  │
//! │  │ (upload, stream, health) │  │ (router config, CORS, fs)   │  │
//! │  └────────────┬─────────────┘  └─────────────────────────────┘  │
//! └───────────────┼─────────────────────────────────────────────────┘
//!                 │ TaskQueue / BroadcastHub
//!                 ▼
//!        processing worker thread
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, stream_handler, upload_handler, AppState, ErrorResponse, HealthResponse,
    UploadResponse, CONNECTED_EVENT, DEFAULT_KIND,
};
pub use routes::{create_router, RouterConfig, DEFAULT_MAX_UPLOAD_BYTES};
