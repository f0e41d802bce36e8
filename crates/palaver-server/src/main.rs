//! # Palaver Server
//!
//! Realtime chat broadcast server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! palaver
//!
//! # Run with environment variables
//! PALAVER_PORT=8080 PALAVER_HOST=0.0.0.0 palaver
//! ```
//!
//! Configuration is also read from `palaver.toml` if present.

use anyhow::Result;
use palaver_server::{config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palaver=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Palaver server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
