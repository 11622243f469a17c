//! Media Ingest Server - Entry Point
//!
//! This is the main entry point for the ingest server.
//! It initializes logging, loads configuration, and starts the HTTP server.

use media_ingest_server::{config::Config, run};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load_default()?;

    // Initialize logging
    init_logging(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Media Ingest Server"
    );

    // Run the server
    run(config).await
}

/// Initialize logging based on configuration
fn init_logging(config: &media_ingest_server::config::LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
