//! Fixed table of channels addressed by id.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use camlink_common::config::AppConfig;
use camlink_common::error::{CamlinkError, CamlinkResult};
use camlink_transcoder::{ProcessSpawner, RelaySettings};
use futures_util::future::join_all;

use crate::channel::{Channel, ChannelStatus};
use crate::forward::ForwardState;
use crate::relay::RelayInfo;
use crate::upload::UploadConfig;

/// Settings shared by every channel, resolved from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub relay: RelaySettings,
    pub bind_host: IpAddr,
    pub public_host: String,
    pub fanout_capacity: usize,
    pub chunk_size: usize,
    pub scan_interval: Duration,
    pub settle_delay: Duration,
    pub upload: UploadConfig,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> CamlinkResult<Self> {
        let bind_host = config.relay.bind_host.parse::<IpAddr>().map_err(|e| {
            CamlinkError::config(format!(
                "relay.bind_host {:?} is not an IP address: {e}",
                config.relay.bind_host
            ))
        })?;

        Ok(Self {
            relay: RelaySettings {
                bitrate: config.transcoder.relay_bitrate.clone(),
                fps: config.transcoder.relay_fps,
            },
            bind_host,
            public_host: config.relay.public_host.clone(),
            fanout_capacity: config.relay.fanout_capacity,
            chunk_size: config.relay.chunk_size,
            scan_interval: Duration::from_millis(config.capture.scan_interval_ms),
            settle_delay: Duration::from_millis(config.upload.settle_delay_ms),
            upload: UploadConfig {
                enabled: config.upload.enabled,
                collector_url: config.upload.collector_url.clone(),
            },
        })
    }
}

/// Every channel of the process, created once at startup.
///
/// Operations on unknown ids fail with [`CamlinkError::ChannelNotFound`]
/// before touching any channel.
pub struct ChannelRegistry {
    channels: Vec<Arc<Channel>>,
}

impl ChannelRegistry {
    /// Build one channel per configured entry. Must be called inside a
    /// Tokio runtime.
    pub fn new(config: &AppConfig, spawner: Arc<dyn ProcessSpawner>) -> CamlinkResult<Self> {
        config.validate()?;
        let settings = Arc::new(EngineSettings::from_config(config)?);

        let channels = config
            .channels
            .iter()
            .map(|entry| {
                let relay_addr = SocketAddr::new(settings.bind_host, entry.relay_port);
                Channel::new(entry.id, relay_addr, Arc::clone(&settings), Arc::clone(&spawner))
            })
            .collect::<Vec<_>>();

        tracing::info!(channels = channels.len(), "Channel registry ready");
        Ok(Self { channels })
    }

    pub fn channel(&self, id: u32) -> CamlinkResult<&Arc<Channel>> {
        self.channels
            .iter()
            .find(|channel| channel.id() == id)
            .ok_or_else(|| CamlinkError::channel_not_found(id))
    }

    pub fn channels(&self) -> &[Arc<Channel>] {
        &self.channels
    }

    pub fn ids(&self) -> Vec<u32> {
        self.channels.iter().map(|channel| channel.id()).collect()
    }

    pub async fn connect(&self, id: u32, source: &str) -> CamlinkResult<RelayInfo> {
        self.channel(id)?.connect(source).await
    }

    pub async fn disconnect(&self, id: u32) -> CamlinkResult<()> {
        self.channel(id)?.disconnect().await
    }

    pub async fn start_capture(
        &self,
        id: u32,
        source: &str,
        session_dir: &Path,
        fps: Option<u32>,
    ) -> CamlinkResult<PathBuf> {
        self.channel(id)?
            .start_capture(source, session_dir, fps)
            .await
    }

    pub async fn stop_capture(&self, id: u32) -> CamlinkResult<()> {
        self.channel(id)?.stop_capture().await
    }

    pub fn set_upload_config(&self, id: u32, config: UploadConfig) -> CamlinkResult<()> {
        self.channel(id)?.set_upload_config(config);
        Ok(())
    }

    pub async fn start_forward(
        &self,
        id: u32,
        source: &str,
        remote_base: &str,
    ) -> CamlinkResult<ForwardState> {
        self.channel(id)?.start_forward(source, remote_base).await
    }

    pub async fn stop_forward(&self, id: u32, remote_base: Option<&str>) -> CamlinkResult<()> {
        self.channel(id)?.stop_forward(remote_base).await
    }

    pub async fn status(&self, id: u32) -> CamlinkResult<ChannelStatus> {
        Ok(self.channel(id)?.status().await)
    }

    pub async fn statuses(&self) -> Vec<ChannelStatus> {
        join_all(self.channels.iter().map(|channel| channel.status())).await
    }

    /// Stop every lifecycle of every channel.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down all channels");
        join_all(self.channels.iter().map(|channel| channel.shutdown())).await;
        tracing::info!("All channels stopped");
    }
}
