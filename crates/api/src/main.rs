//! Bikehood Dashboard - Main Entry Point

use api::{config::AppConfig, init_logging, run_server};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.log)?;

    info!("=== Bikehood Dashboard v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Serving sensor data from {}", config.database.url);

    run_server(config).await
}
