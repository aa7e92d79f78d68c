//! consenso - multi-engine OCR field consensus pipeline.
//!
//! Turns scanned vehicle-invoice PDFs into one trusted value per field by
//! cross-checking several OCR engines against each other.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use consenso::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_debug() {
        "consenso=debug"
    } else {
        "consenso=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}
