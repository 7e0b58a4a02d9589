//! Frame upload pipeline.
//!
//! The frame watcher produces paths, a single worker per channel consumes
//! them in discovery order and posts each frame to the collector. At most
//! one upload per channel is in flight; failures are logged and never
//! retried.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camlink_common::clock::epoch_millis;
use camlink_common::error::{CamlinkError, CamlinkResult};
use camlink_transcoder::is_frame_file;
use parking_lot::{Mutex, RwLock};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Upload settings of one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    pub enabled: bool,
    #[serde(default)]
    pub collector_url: Option<String>,
}

impl UploadConfig {
    /// Whether newly discovered frames should be queued.
    pub fn is_active(&self) -> bool {
        self.enabled && self.collector().is_some()
    }

    fn collector(&self) -> Option<&str> {
        self.collector_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Upload counters of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadStats {
    /// Requests sent to the collector.
    pub attempted: u64,
    /// Requests that failed or were rejected.
    pub failed: u64,
    /// Queued frames dropped before upload (file vanished or collector cleared).
    pub skipped: u64,
}

pub struct UploadPipeline {
    channel: u32,
    client: reqwest::Client,
    config: RwLock<UploadConfig>,
    queue: Mutex<VecDeque<PathBuf>>,
    wake: Notify,
    uploading: AtomicBool,
    settle_delay: Duration,
    stats: Mutex<UploadStats>,
}

impl UploadPipeline {
    pub fn new(channel: u32, config: UploadConfig, settle_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            channel,
            client: reqwest::Client::new(),
            config: RwLock::new(config),
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            uploading: AtomicBool::new(false),
            settle_delay,
            stats: Mutex::new(UploadStats::default()),
        })
    }

    /// Start the channel's upload worker. It drains the queue, then parks
    /// until the next enqueue.
    pub fn spawn_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run().await })
    }

    /// Handle a file reported by the watcher. Returns whether it was queued.
    ///
    /// Gating is decided here, at discovery time: frames already queued stay
    /// queued when uploads are disabled later.
    pub fn on_file_created(&self, path: PathBuf) -> bool {
        if !is_frame_file(&path) {
            return false;
        }
        if !self.config.read().is_active() {
            tracing::trace!(channel = self.channel, path = %path.display(), "Uploads inactive, not queued");
            return false;
        }
        self.queue.lock().push_back(path);
        self.wake.notify_one();
        true
    }

    pub fn set_config(&self, config: UploadConfig) {
        tracing::info!(
            channel = self.channel,
            enabled = config.enabled,
            collector = ?config.collector_url,
            "Upload configuration updated"
        );
        *self.config.write() = config;
    }

    pub fn config(&self) -> UploadConfig {
        self.config.read().clone()
    }

    /// Frames waiting behind the in-flight upload.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::SeqCst)
    }

    /// Nothing queued and nothing in flight.
    pub fn is_idle(&self) -> bool {
        let queue = self.queue.lock();
        queue.is_empty() && !self.is_uploading()
    }

    pub fn stats(&self) -> UploadStats {
        *self.stats.lock()
    }

    async fn run(&self) {
        loop {
            let next = {
                let mut queue = self.queue.lock();
                let next = queue.pop_front();
                // Flag flips under the queue lock so idleness is never observed mid-handoff.
                if next.is_some() {
                    self.uploading.store(true, Ordering::SeqCst);
                }
                next
            };

            match next {
                Some(path) => {
                    self.process(&path).await;
                    self.uploading.store(false, Ordering::SeqCst);
                }
                None => self.wake.notified().await,
            }
        }
    }

    async fn process(&self, path: &Path) {
        tokio::time::sleep(self.settle_delay).await;

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::debug!(channel = self.channel, path = %path.display(), "Frame vanished, skipping");
            self.stats.lock().skipped += 1;
            return;
        }

        let collector = self.config.read().collector().map(str::to_string);
        let Some(collector) = collector else {
            tracing::debug!(channel = self.channel, path = %path.display(), "Collector cleared, dropping frame");
            self.stats.lock().skipped += 1;
            return;
        };

        self.stats.lock().attempted += 1;
        match self.upload(path, &collector).await {
            Ok(()) => {
                tracing::debug!(channel = self.channel, path = %path.display(), "Frame uploaded");
            }
            Err(e) => {
                self.stats.lock().failed += 1;
                tracing::warn!(channel = self.channel, path = %path.display(), error = %e, "Frame upload failed");
            }
        }
    }

    async fn upload(&self, path: &Path, collector: &str) -> CamlinkResult<()> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame.jpg".to_string());

        let frame = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")
            .map_err(|e| CamlinkError::upload(e.to_string()))?;
        let form = Form::new()
            .part("frame", frame)
            .text("channel", self.channel.to_string())
            .text("timestamp", epoch_millis().to_string());

        let response = self
            .client
            .post(collector)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CamlinkError::upload(format!("Request to {collector} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CamlinkError::upload(format!(
                "Collector {collector} replied {status}"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for UploadPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadPipeline")
            .field("channel", &self.channel)
            .field("pending", &self.pending())
            .field("uploading", &self.is_uploading())
            .finish_non_exhaustive()
    }
}
