//! Portfolio server - uploads, image processing and live updates.
//!
//! This binary starts the HTTP server and the background processing worker.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portfolio_server::{
    config::Config,
    events::BroadcastHub,
    imaging::{AdvancedEnhancer, FastEnhancer, ThumbnailGenerator, VisionCapabilities},
    processing::{task_queue, ProcessingWorker},
    server::{create_router, AppState, RouterConfig},
    uploads::UploadLayout,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner();

    let layout = UploadLayout::new(&config.uploads_dir);
    if let Err(e) = layout.ensure_dirs() {
        error!(
            "Failed to create uploads directory {}: {}",
            layout.uploads_dir().display(),
            e
        );
        return ExitCode::FAILURE;
    }

    let capabilities = VisionCapabilities::detect(config.advanced_enhance, config.ocr_binary());

    info!("Configuration:");
    info!("  Uploads: {}", layout.uploads_dir().display());
    info!(
        "  Thumbnails: {}x{} (quality {})",
        config.thumb_width, config.thumb_height, config.thumb_quality
    );
    info!(
        "  Enhancement: {}x{} (quality {})",
        config.enhance_max_width, config.enhance_max_height, config.enhance_quality
    );
    if capabilities.has_deep_vision() {
        info!("  Advanced processing: enabled");
    } else {
        warn!("  Advanced processing: disabled");
    }
    info!(
        "  OCR crop: {}",
        if capabilities.has_ocr() { "enabled" } else { "unavailable" }
    );

    let hub = BroadcastHub::new();
    let thumbnails =
        ThumbnailGenerator::new(config.thumbnail_size()).with_quality(config.thumb_quality);
    let fast = FastEnhancer::new(config.enhance_size()).with_quality(config.enhance_quality);

    let (queue, receiver) = task_queue();
    let worker = ProcessingWorker::new(
        AdvancedEnhancer::new(capabilities).with_max_size(config.enhance_size()),
        thumbnails,
        layout.clone(),
        hub.clone(),
    );
    let worker = match worker.spawn(receiver) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to start processing worker: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let state = AppState::new(hub.clone(), queue.clone(), layout)
        .with_fast_enhancer(fast)
        .with_thumbnails(thumbnails);
    let router = create_router(state, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl -N http://{}/stream", addr);
    info!("    curl -F file=@photo.jpg -F kind=snap http://{}/api/upload", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            queue.shutdown();
            hub.close();
            return ExitCode::FAILURE;
        }
    };

    let shutdown_hub = hub.clone();
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutting down");
            // Open event streams only end once their queues are dropped
            shutdown_hub.close();
        })
        .await;

    queue.shutdown();
    hub.close();
    let processed = tokio::task::spawn_blocking(move || worker.join())
        .await
        .unwrap_or(0);
    info!("Processing worker finished ({} tasks)", processed);

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("██████╗  ██████╗ ██████╗ ████████╗███████╗ ██████╗ ██╗     ██╗ ██████╗ ");
    info!("██╔══██╗██╔═══██╗██╔══██╗╚══██╔══╝██╔════╝██╔═══██╗██║     ██║██╔═══██╗");
    info!("██████╔╝██║   ██║██████╔╝   ██║   █████╗  ██║   ██║██║     ██║██║   ██║");
    info!("██╔═══╝ ██║   ██║██╔══██╗   ██║   ██╔══╝  ██║   ██║██║     ██║██║   ██║");
    info!("██║     ╚██████╔╝██║  ██║   ██║   ██║     ╚██████╔╝███████╗██║╚██████╔╝");
    info!("╚═╝      ╚═════╝ ╚═╝  ╚═╝   ╚═╝   ╚═╝      ╚═════╝ ╚══════╝╚═╝ ╚═════╝ ");
    info!("");
    info!("                              v{}", version);
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "portfolio_server=debug,tower_http=debug"
    } else {
        "portfolio_server=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_max_upload_bytes(config.max_upload_bytes)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
