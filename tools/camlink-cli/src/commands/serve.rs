//! Serve the control API over the real transcoder.

use std::sync::Arc;

use anyhow::Context;
use camlink_common::config::AppConfig;
use camlink_control::ControlState;
use camlink_engine::ChannelRegistry;
use camlink_transcoder::CommandSpawner;

pub async fn run(mut config: AppConfig, bind: Option<String>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.control.bind = bind;
    }

    let spawner = Arc::new(CommandSpawner::new(&config.transcoder.program));
    let registry = Arc::new(ChannelRegistry::new(&config, spawner)?);

    for channel in registry.channels() {
        tracing::info!(
            channel = channel.id(),
            relay = %channel.relay_addr(),
            "Channel ready"
        );
    }

    let listener = tokio::net::TcpListener::bind(&config.control.bind)
        .await
        .with_context(|| format!("Failed to bind control API to {}", config.control.bind))?;

    println!("Camlink control API on http://{}", listener.local_addr()?);
    println!("Press Ctrl+C to stop...");

    let state = ControlState::new(registry.clone(), Arc::new(config));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };
    camlink_control::serve(listener, state, shutdown).await?;

    println!();
    println!("Shutting down channels...");
    registry.shutdown().await;
    tracing::info!("All channels stopped");

    Ok(())
}
