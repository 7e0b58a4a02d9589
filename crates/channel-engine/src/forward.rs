//! Forwarding session: handshake with the ingest service, then stream-copy
//! the source to the port it allocated.
//!
//! ```text
//!   Idle ──start──► Handshaking ──port──► Forwarding
//!    ▲                   │                    │
//!    └──── refused ──────┘                    │
//!    └──────────── stop / transcoder exit ────┘
//! ```

use std::sync::{Arc, Weak};

use camlink_common::error::{CamlinkError, CamlinkResult};
use camlink_transcoder::{Invocation, ProcessExit, ProcessSpawner, TranscoderProcess};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::ingest::{normalize_base_url, remote_host, IngestClient};

/// Observable state of a forwarding session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ForwardState {
    Idle,
    Handshaking,
    Forwarding { target: String },
}

impl ForwardState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

struct ForwardInner {
    state: ForwardState,
    process: Option<TranscoderProcess>,
    /// Bumped on every start and stop; stale handshakes and exit watchers
    /// compare against it.
    generation: u64,
    /// Ingest base URL of the latest start, used when a stop names none.
    remote: Option<String>,
}

pub struct ForwardSession {
    channel: u32,
    label: String,
    spawner: Arc<dyn ProcessSpawner>,
    ingest: IngestClient,
    inner: Mutex<ForwardInner>,
}

impl ForwardSession {
    pub fn new(channel: u32, spawner: Arc<dyn ProcessSpawner>, ingest: IngestClient) -> Arc<Self> {
        Arc::new(Self {
            channel,
            label: format!("ch{channel}-forward"),
            spawner,
            ingest,
            inner: Mutex::new(ForwardInner {
                state: ForwardState::Idle,
                process: None,
                generation: 0,
                remote: None,
            }),
        })
    }

    pub fn state(&self) -> ForwardState {
        self.inner.lock().state.clone()
    }

    /// Handshake and start forwarding `source`.
    ///
    /// A start while a session is handshaking or forwarding returns the
    /// current state without contacting the ingest service again.
    pub async fn start(self: &Arc<Self>, source: &str, remote_base: &str) -> CamlinkResult<ForwardState> {
        let remote = normalize_base_url(remote_base).to_string();
        let host = remote_host(&remote)?;

        let generation = {
            let mut inner = self.inner.lock();
            if !inner.state.is_idle() {
                tracing::debug!(channel = self.channel, state = ?inner.state, "Forward already active");
                return Ok(inner.state.clone());
            }
            inner.generation += 1;
            inner.state = ForwardState::Handshaking;
            inner.remote = Some(remote.clone());
            inner.generation
        };

        tracing::info!(channel = self.channel, remote = %remote, "Starting forward handshake");
        let handshake = self.ingest.start_capture(&remote, self.channel).await;

        let (state, exit) = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return Err(CamlinkError::forward(format!(
                    "Forward for channel {} was stopped during the handshake",
                    self.channel
                )));
            }

            let port = match handshake {
                Ok(port) => port,
                Err(e) => {
                    inner.state = ForwardState::Idle;
                    tracing::warn!(channel = self.channel, error = %e, "Forward handshake failed");
                    return Err(e);
                }
            };

            let invocation = Invocation::forward(source, &host, port);
            let mut process = match self.spawner.spawn(&self.label, &invocation) {
                Ok(process) => process,
                Err(e) => {
                    inner.state = ForwardState::Idle;
                    return Err(e);
                }
            };

            let exit = process.take_exit();
            inner.process = Some(process);
            inner.state = ForwardState::Forwarding {
                target: format!("{host}:{port}"),
            };
            (inner.state.clone(), exit)
        };

        if let Some(exit) = exit {
            watch_exit(Arc::downgrade(self), generation, exit);
        }
        tracing::info!(channel = self.channel, ?state, "Forwarding");
        Ok(state)
    }

    /// Stop forwarding and notify the ingest service.
    ///
    /// The local session is idle when this returns, whether or not the
    /// notification reached the service.
    pub async fn stop(&self, remote_base: Option<&str>) {
        let (_, remote) = self.halt(remote_base);
        if let Some(remote) = remote {
            self.notify_stopped(&remote).await;
        }
    }

    /// Stop forwarding, notifying the ingest service only if a session was
    /// active.
    pub async fn shutdown(&self) {
        let (previous, remote) = self.halt(None);
        if previous.is_idle() {
            return;
        }
        if let Some(remote) = remote {
            self.notify_stopped(&remote).await;
        }
    }

    fn halt(&self, remote_base: Option<&str>) -> (ForwardState, Option<String>) {
        let (previous, process, remote) = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            let previous = std::mem::replace(&mut inner.state, ForwardState::Idle);
            let remote = remote_base
                .map(|base| normalize_base_url(base).to_string())
                .or_else(|| inner.remote.clone());
            (previous, inner.process.take(), remote)
        };

        if let Some(process) = process {
            process.kill();
        }
        if !previous.is_idle() {
            tracing::info!(channel = self.channel, ?previous, "Forward stopped");
        }
        (previous, remote)
    }

    async fn notify_stopped(&self, remote: &str) {
        if let Err(e) = self.ingest.stop_capture(remote, self.channel).await {
            tracing::warn!(channel = self.channel, error = %e, "Failed to notify ingest service");
        }
    }
}

/// Return the session to idle if its transcoder ends on its own.
fn watch_exit(session: Weak<ForwardSession>, generation: u64, exit: oneshot::Receiver<ProcessExit>) {
    tokio::spawn(async move {
        let Ok(exit) = exit.await else {
            return;
        };
        if exit.is_killed() {
            return;
        }
        let Some(session) = session.upgrade() else {
            return;
        };

        let mut inner = session.inner.lock();
        if inner.generation == generation && !inner.state.is_idle() {
            tracing::warn!(channel = session.channel, ?exit, "Forward transcoder exited unexpectedly");
            inner.state = ForwardState::Idle;
            inner.process = None;
        }
    });
}
