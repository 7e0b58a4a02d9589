//! Viewer fan-out for one channel's relay output.
//!
//! Viewers connect over WebSocket to the channel's relay endpoint. Each new
//! viewer first receives [`STREAM_PREAMBLE`], then every chunk the relay
//! transcoder writes, as binary messages.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use camlink_common::error::{CamlinkError, CamlinkResult};
use camlink_transcoder::ProcessOutput;
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Magic bytes sent to every viewer before any media (ASCII `jsmp`).
pub const STREAM_PREAMBLE: [u8; 4] = *b"jsmp";

/// Upper bound on waiting for the listener to be released on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
struct ViewerState {
    chunks: broadcast::Sender<Bytes>,
    closing: watch::Receiver<bool>,
}

/// A bound viewer endpoint plus the task pumping transcoder output into it.
///
/// Delivery is best-effort per viewer: each viewer has a bounded backlog of
/// `capacity` chunks, and a viewer that falls further behind skips the
/// chunks it missed instead of buffering them.
pub struct BroadcastTransport {
    local_addr: SocketAddr,
    chunks: broadcast::Sender<Bytes>,
    closing: watch::Sender<bool>,
    server: JoinHandle<()>,
    pump: Option<JoinHandle<()>>,
}

impl BroadcastTransport {
    /// Bind the viewer endpoint at `addr` and start accepting viewers.
    pub async fn bind(addr: SocketAddr, capacity: usize) -> CamlinkResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CamlinkError::relay(format!("Failed to bind viewer endpoint {addr}: {e}")))?;
        let local_addr = listener.local_addr()?;

        let (chunks, _) = broadcast::channel(capacity.max(1));
        let (closing, closing_rx) = watch::channel(false);

        let app = Router::new()
            .route("/", get(upgrade_viewer))
            .with_state(ViewerState {
                chunks: chunks.clone(),
                closing: closing_rx.clone(),
            });

        let mut shutdown_rx = closing_rx;
        let server = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.wait_for(|closing| *closing).await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::warn!(%local_addr, error = %e, "Viewer endpoint failed");
            }
        });

        tracing::debug!(%local_addr, "Viewer endpoint listening");

        Ok(Self {
            local_addr,
            chunks,
            closing,
            server,
            pump: None,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently connected viewers.
    pub fn viewer_count(&self) -> usize {
        self.chunks.receiver_count()
    }

    /// Start forwarding `output` to viewers in reads of up to `chunk_size`
    /// bytes. Replaces any previously attached output.
    pub fn attach(&mut self, mut output: ProcessOutput, chunk_size: usize) {
        if let Some(previous) = self.pump.take() {
            previous.abort();
        }

        let chunks = self.chunks.clone();
        let local_addr = self.local_addr;
        let chunk_size = chunk_size.max(1);
        self.pump = Some(tokio::spawn(async move {
            let mut buf = vec![0u8; chunk_size];
            loop {
                match output.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        // No viewers is not an error.
                        let _ = chunks.send(Bytes::copy_from_slice(&buf[..n]));
                    }
                    Err(e) => {
                        tracing::warn!(%local_addr, error = %e, "Relay output read failed");
                        break;
                    }
                }
            }
            tracing::debug!(%local_addr, "Relay output ended");
        }));
    }

    /// Disconnect all viewers and release the endpoint.
    pub async fn shutdown(mut self) {
        let _ = self.closing.send(true);
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.server)
            .await
            .is_err()
        {
            tracing::warn!(local_addr = %self.local_addr, "Viewer endpoint slow to close, aborting");
            self.server.abort();
            let _ = (&mut self.server).await;
        }
        tracing::debug!(local_addr = %self.local_addr, "Viewer endpoint closed");
    }
}

impl Drop for BroadcastTransport {
    fn drop(&mut self) {
        let _ = self.closing.send(true);
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn upgrade_viewer(ws: WebSocketUpgrade, State(state): State<ViewerState>) -> Response {
    let chunks = state.chunks.subscribe();
    ws.on_upgrade(move |socket| serve_viewer(socket, chunks, state.closing))
}

async fn serve_viewer(
    socket: WebSocket,
    mut chunks: broadcast::Receiver<Bytes>,
    mut closing: watch::Receiver<bool>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    if *closing.borrow() {
        return;
    }
    if ws_tx
        .send(Message::Binary(Bytes::from_static(&STREAM_PREAMBLE)))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            chunk = chunks.recv() => match chunk {
                Ok(bytes) => {
                    if ws_tx.send(Message::Binary(bytes)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "Viewer lagged, skipping chunks");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
            _ = closing.changed() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }

    tracing::debug!("Viewer disconnected");
}
