//! # Portfolio Server
//!
//! Upload handling and background image processing for a personal portfolio
//! site, with live updates pushed to open browser tabs.
//!
//! ## Features
//!
//! - **Uploads**: multipart uploads with filename sanitizing and collision avoidance
//! - **Fast enhancement**: EXIF orientation, bounded resize, autocontrast and sharpening before the response
//! - **Thumbnails**: bounded previews, regenerated after background processing
//! - **Background processing**: denoise, deskew and OCR-guided crop on a single worker thread
//! - **Live updates**: a text event stream notifying every open tab when processing completes
//!
//! ## Architecture
//!
//! - [`imaging`] - Thumbnail generator and the fast/advanced enhancers
//! - [`events`] - Broadcast hub and subscriptions
//! - [`processing`] - Task queue and processing worker
//! - [`uploads`] - On-disk layout and filename rules
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use portfolio_server::{
//!     create_router, task_queue, AdvancedEnhancer, AppState, BroadcastHub, ProcessingWorker,
//!     RouterConfig, ThumbnailGenerator, UploadLayout, VisionCapabilities,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let layout = UploadLayout::new("static/uploads");
//!     layout.ensure_dirs().unwrap();
//!
//!     let hub = BroadcastHub::new();
//!     let (queue, receiver) = task_queue();
//!     let _worker = ProcessingWorker::new(
//!         AdvancedEnhancer::new(VisionCapabilities::deep_vision()),
//!         ThumbnailGenerator::default(),
//!         layout.clone(),
//!         hub.clone(),
//!     )
//!     .spawn(receiver)
//!     .unwrap();
//!
//!     let router = create_router(AppState::new(hub, queue, layout), RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod imaging;
pub mod processing;
pub mod server;
pub mod uploads;

// Re-export commonly used types
pub use config::Config;
pub use error::{EnhanceError, UploadError};
pub use events::{BroadcastHub, Event, Subscription};
pub use imaging::{
    AdvancedEnhancer, EnhanceReport, FastEnhancer, Stage, StageOutcome, TesseractCli, TextBox,
    TextDetector, ThumbnailGenerator, VisionCapabilities,
};
pub use processing::{
    task_queue, ProcessedEvent, ProcessingWorker, Task, TaskQueue, WorkerHandle, PROCESSED_EVENT,
};
pub use server::{create_router, AppState, ErrorResponse, RouterConfig};
pub use uploads::UploadLayout;
