use anyhow::Context;
use chrono::Utc;
use multiplus_emulator::{
    subscribe_upstream, EmulatorConfig, EnergyAccumulator, LocalBus, Publisher,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting MultiPlus emulator");
    let config = Arc::new(EmulatorConfig::from_env().context("invalid configuration")?);
    info!(
        service = %config.service_name,
        phases = ?config.phases,
        grid_frequency = config.grid_frequency,
        battery_service = config.battery_service.as_deref().unwrap_or("any"),
        grid_service = config.grid_service.as_deref().unwrap_or("any"),
        "loaded configuration"
    );

    let bus = LocalBus::new();
    // Subscribe before registering so no upstream update is missed.
    let events = subscribe_upstream(&bus);
    let accumulator = EnergyAccumulator::open(&config.energy, Utc::now());
    let publisher = Publisher::new(bus, config, accumulator)?;

    publisher
        .run(events, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("MultiPlus emulator stopped");
    Ok(())
}
