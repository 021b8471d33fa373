use alfen_wallbox::{AlfenDevice, Config, Poller};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    config.validate().context("Invalid configuration")?;

    alfen_wallbox::logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Alfen wallbox poller {} starting for {}",
        env!("APP_VERSION"),
        config.device.host
    );

    let (device, refresh_rx) = AlfenDevice::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to create device: {}", e))?;
    let device = Arc::new(device);

    if !device.init().await {
        warn!("Device init incomplete; polling will keep retrying the login");
    }

    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(());
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    Poller::new(device.clone(), refresh_rx).run(shutdown_rx).await;

    device.logout().await;
    info!("Poller shutdown complete");
    Ok(())
}
