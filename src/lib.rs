//! # Media Ingest Server
//!
//! A resumable chunked-upload ingest server for media files written in Rust.
//!
//! ## Features
//!
//! - **Chunked Upload**: Large files arrive as fixed-size chunks, in any
//!   order, with pause/resume and parallel transmission
//! - **Integrity**: Every finalised file is verified against the client's
//!   declared MD5 digest
//! - **Content Validation**: Byte signatures are checked against the
//!   declared media type before anything reaches durable storage
//! - **Deduplication**: Identical payloads are detected at initiation and
//!   stored once
//! - **Lifecycle Sweeping**: Abandoned staging directories and expired
//!   stored objects are reclaimed in the background
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  HTTP Server                    │
//! │  ┌──────────────────────────┐  ┌────────────┐   │
//! │  │       Upload API         │  │   Health   │   │
//! │  └──────────────────────────┘  └────────────┘   │
//! ├─────────────────────────────────────────────────┤
//! │                Upload Manager                   │
//! │  ┌─────────┐ ┌──────────┐ ┌───────┐ ┌────────┐  │
//! │  │ Staging │ │ Validate │ │ Dedup │ │ Object │  │
//! │  │         │ │ + Digest │ │ Index │ │ Store  │  │
//! │  └─────────┘ └──────────┘ └───────┘ └────────┘  │
//! ├─────────────────────────────────────────────────┤
//! │              File System / RocksDB              │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the server
//! cargo run --release
//!
//! # Declare an upload
//! curl -X POST http://localhost:3000/api/upload/initiate \
//!   -H "Content-Type: application/json" \
//!   -d '{"filename":"pic.jpg","mimeType":"image/jpeg","fileSize":123,"md5Hash":"..."}'
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;

use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Multipart framing headroom on top of the chunk size for the body limit
const BODY_LIMIT_HEADROOM: usize = 64 * 1024;

/// Run the ingest server with the given configuration.
///
/// Starts the HTTP server and the background sweeper tasks.
pub async fn run(config: Config) -> anyhow::Result<()> {
    // Create application state
    let state = AppState::new(config.clone()).await?;

    let app = create_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid server address");

    info!(address = %addr, "Ingest server starting");

    // Start sweeper tasks
    let staging_state = state.clone();
    tokio::spawn(async move {
        staging_sweeper(staging_state).await;
    });

    let object_state = state.clone();
    tokio::spawn(async move {
        object_sweeper(object_state).await;
    });

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Body size limit: one chunk plus multipart framing
    let body_limit =
        RequestBodyLimitLayer::new(state.chunk_size() as usize + BODY_LIMIT_HEADROOM);

    let timeout = TimeoutLayer::new(Duration::from_secs(state.config.server.request_timeout));

    Router::new()
        .nest(
            "/api/upload",
            handlers::upload_routes().merge(handlers::health_routes()),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(timeout)
                .layer(body_limit),
        )
        .with_state(state)
}

/// Background task that reclaims expired staging directories
async fn staging_sweeper(state: AppState) {
    let interval = Duration::from_secs(state.config.retention.staging_sweep_interval_seconds);

    loop {
        tokio::time::sleep(interval).await;

        match state.staging.purge_expired(state.chunk_timeout()).await {
            Ok(purged) if purged > 0 => {
                info!(purged = purged, "Staging sweep completed");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Staging sweep failed"),
        }
    }
}

/// Background task that reclaims expired stored objects
async fn object_sweeper(state: AppState) {
    let interval = Duration::from_secs(state.config.retention.object_sweep_interval_seconds);

    loop {
        tokio::time::sleep(interval).await;

        match services::sweeper::purge_expired_objects(state.store.root(), state.retention_days())
            .await
        {
            Ok(report) => {
                info!(
                    scanned = report.scanned,
                    deleted = report.deleted,
                    errors = report.errors,
                    freed_bytes = report.freed_bytes,
                    "Object sweep completed"
                );

                if let Ok(stats) = state.store.stats().await {
                    info!(
                        file_count = stats.file_count,
                        total_bytes = stats.total_bytes,
                        "Object store stats after sweep"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Object sweep failed"),
        }
    }
}
