//! One camera source and its relay, capture, upload, and forward lifecycles.
//!
//! The three process lifecycles are guarded separately, so starting or
//! stopping one never waits on another, and channels share no locks.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use camlink_common::error::CamlinkResult;
use camlink_transcoder::{ProcessExit, ProcessSpawner};
use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::capture::CaptureSession;
use crate::forward::{ForwardSession, ForwardState};
use crate::ingest::IngestClient;
use crate::registry::EngineSettings;
use crate::relay::{RelayInfo, RelaySession};
use crate::upload::{UploadConfig, UploadPipeline, UploadStats};

/// Snapshot of a channel for callers.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatus {
    pub id: u32,
    pub relay_endpoint: SocketAddr,
    pub relaying: bool,
    pub relay_source: Option<String>,
    pub viewers: usize,
    pub capture_dir: Option<PathBuf>,
    pub upload: UploadConfig,
    pub pending_uploads: usize,
    pub uploading: bool,
    pub upload_stats: UploadStats,
    pub forward: ForwardState,
}

pub struct Channel {
    id: u32,
    relay_addr: SocketAddr,
    settings: Arc<EngineSettings>,
    spawner: Arc<dyn ProcessSpawner>,
    relay: Mutex<Option<RelaySession>>,
    relay_generation: AtomicU64,
    capture: Mutex<Option<CaptureSession>>,
    uploads: Arc<UploadPipeline>,
    upload_worker: JoinHandle<()>,
    forward: Arc<ForwardSession>,
}

impl Channel {
    /// Create the channel and start its upload worker. Must be called
    /// inside a Tokio runtime.
    pub fn new(
        id: u32,
        relay_addr: SocketAddr,
        settings: Arc<EngineSettings>,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> Arc<Self> {
        let uploads = UploadPipeline::new(id, settings.upload.clone(), settings.settle_delay);
        let upload_worker = uploads.spawn_worker();
        let forward = ForwardSession::new(id, Arc::clone(&spawner), IngestClient::new());

        Arc::new(Self {
            id,
            relay_addr,
            settings,
            spawner,
            relay: Mutex::new(None),
            relay_generation: AtomicU64::new(0),
            capture: Mutex::new(None),
            uploads,
            upload_worker,
            forward,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Configured viewer endpoint.
    pub fn relay_addr(&self) -> SocketAddr {
        self.relay_addr
    }

    pub fn uploads(&self) -> &Arc<UploadPipeline> {
        &self.uploads
    }

    fn label(&self, task: &str) -> String {
        format!("ch{}-{task}", self.id)
    }

    /// Start relaying `source` to viewers, replacing a running relay.
    pub async fn connect(self: &Arc<Self>, source: &str) -> CamlinkResult<RelayInfo> {
        let mut relay = self.relay.lock().await;
        if let Some(previous) = relay.take() {
            tracing::info!(channel = self.id, "Replacing active relay");
            previous.stop().await;
        }

        let generation = self.relay_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (session, exit) = RelaySession::start(
            &self.label("relay"),
            generation,
            self.spawner.as_ref(),
            &self.settings,
            self.relay_addr,
            source,
        )
        .await?;

        let info = session.info(&self.settings.public_host);
        *relay = Some(session);
        drop(relay);

        if let Some(exit) = exit {
            self.watch_relay_exit(generation, exit);
        }
        tracing::info!(channel = self.id, url = %info.url, "Relay started");
        Ok(info)
    }

    /// Stop relaying. Stopping an idle relay is not an error.
    pub async fn disconnect(&self) -> CamlinkResult<()> {
        let session = self.relay.lock().await.take();
        if let Some(session) = session {
            session.stop().await;
            tracing::info!(channel = self.id, "Relay stopped");
        }
        Ok(())
    }

    /// A relay transcoder that dies on its own takes its endpoint down with it.
    fn watch_relay_exit(self: &Arc<Self>, generation: u64, exit: oneshot::Receiver<ProcessExit>) {
        let channel = Arc::downgrade(self);
        tokio::spawn(async move {
            let Ok(exit) = exit.await else {
                return;
            };
            if exit.is_killed() {
                return;
            }
            let Some(channel) = channel.upgrade() else {
                return;
            };

            let session = {
                let mut relay = channel.relay.lock().await;
                let current = relay.as_ref().map(|session| session.generation);
                if current == Some(generation) {
                    relay.take()
                } else {
                    None
                }
            };
            if let Some(session) = session {
                tracing::warn!(channel = channel.id, ?exit, "Relay transcoder exited unexpectedly");
                session.stop().await;
            }
        });
    }

    /// Start capturing `source` into `session_dir`, replacing a running
    /// capture. Returns the absolute capture directory.
    pub async fn start_capture(
        &self,
        source: &str,
        session_dir: &Path,
        fps: Option<u32>,
    ) -> CamlinkResult<PathBuf> {
        let mut capture = self.capture.lock().await;
        if let Some(previous) = capture.take() {
            let dir = previous.stop();
            tracing::info!(channel = self.id, dir = %dir.display(), "Replacing active capture");
        }

        let uploads = Arc::clone(&self.uploads);
        let session = CaptureSession::start(
            &self.label("capture"),
            self.spawner.as_ref(),
            source,
            session_dir,
            fps,
            self.settings.scan_interval,
            move |path| {
                uploads.on_file_created(path);
            },
        )
        .await?;

        let dir = session.dir().to_path_buf();
        *capture = Some(session);
        Ok(dir)
    }

    /// Stop capturing. Written frames and already queued uploads are kept.
    pub async fn stop_capture(&self) -> CamlinkResult<()> {
        let session = self.capture.lock().await.take();
        if let Some(session) = session {
            let dir = session.stop();
            tracing::info!(channel = self.id, dir = %dir.display(), "Capture stopped");
        }
        Ok(())
    }

    pub async fn capture_dir(&self) -> Option<PathBuf> {
        self.capture
            .lock()
            .await
            .as_ref()
            .map(|session| session.dir().to_path_buf())
    }

    /// Applies to frames discovered from now on.
    pub fn set_upload_config(&self, config: UploadConfig) {
        self.uploads.set_config(config);
    }

    pub async fn start_forward(&self, source: &str, remote_base: &str) -> CamlinkResult<ForwardState> {
        self.forward.start(source, remote_base).await
    }

    /// Stop forwarding. `remote_base` defaults to the one the forward was
    /// started with.
    pub async fn stop_forward(&self, remote_base: Option<&str>) -> CamlinkResult<()> {
        self.forward.stop(remote_base).await;
        Ok(())
    }

    pub fn forward_state(&self) -> ForwardState {
        self.forward.state()
    }

    /// Stop relay, capture, and forward, whatever their state.
    pub async fn shutdown(&self) {
        let relay = async {
            if let Err(e) = self.disconnect().await {
                tracing::warn!(channel = self.id, error = %e, "Relay stop failed");
            }
        };
        let capture = async {
            if let Err(e) = self.stop_capture().await {
                tracing::warn!(channel = self.id, error = %e, "Capture stop failed");
            }
        };
        tokio::join!(relay, capture, self.forward.shutdown());
    }

    pub async fn status(&self) -> ChannelStatus {
        let (relaying, relay_source, viewers) = {
            let relay = self.relay.lock().await;
            match relay.as_ref() {
                Some(session) => (true, Some(session.source().to_string()), session.viewers()),
                None => (false, None, 0),
            }
        };

        ChannelStatus {
            id: self.id,
            relay_endpoint: self.relay_addr,
            relaying,
            relay_source,
            viewers,
            capture_dir: self.capture_dir().await,
            upload: self.uploads.config(),
            pending_uploads: self.uploads.pending(),
            uploading: self.uploads.is_uploading(),
            upload_stats: self.uploads.stats(),
            forward: self.forward.state(),
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.upload_worker.abort();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("relay_addr", &self.relay_addr)
            .finish_non_exhaustive()
    }
}
