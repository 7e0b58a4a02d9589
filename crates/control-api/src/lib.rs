//! Camlink Control API
//!
//! HTTP surface over the channel registry. Every reply is JSON with a
//! `success` flag; failures add an `error` message.
//!
//! Per-channel routes:
//! - `GET  /channels`: status of every channel
//! - `GET  /channels/{id}`: status of one channel
//! - `POST /channels/{id}/connect`: start (or restart) the live relay
//! - `POST /channels/{id}/disconnect`
//! - `POST /channels/{id}/capture/start`: begin a frame capture session
//! - `POST /channels/{id}/capture/stop`
//! - `PUT  /channels/{id}/upload`: replace the upload configuration
//! - `POST /channels/{id}/forward/start`: hand the stream to a remote ingest
//! - `POST /channels/{id}/forward/stop`
//!
//! Batch routes (GET or POST), acting on every channel with a configured
//! source:
//! - `/connect`
//! - `/capture?fps=N`: replies with the session directory of each channel
//!   and the outcome of each start
//! - `/stop_capture`

pub mod batch;
pub mod error;
pub mod routes;

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use camlink_common::config::AppConfig;
use camlink_common::error::{CamlinkError, CamlinkResult};
use camlink_engine::ChannelRegistry;
use tokio::net::TcpListener;

pub use error::{ApiError, ApiResult};

/// Shared handler state.
#[derive(Clone)]
pub struct ControlState {
    pub registry: Arc<ChannelRegistry>,
    pub config: Arc<AppConfig>,
}

impl ControlState {
    pub fn new(registry: Arc<ChannelRegistry>, config: Arc<AppConfig>) -> Self {
        Self { registry, config }
    }

    /// The source to use for a channel: the request's, else the configured one.
    pub(crate) fn source_for(&self, id: u32, requested: Option<String>) -> CamlinkResult<String> {
        requested
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.config.channel(id).and_then(|c| c.source_url.clone()))
            .ok_or_else(|| {
                CamlinkError::config(format!("No source URL given or configured for channel {id}"))
            })
    }
}

/// Build the control router.
pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/channels", get(routes::list_channels))
        .route("/channels/{id}", get(routes::channel_status))
        .route("/channels/{id}/connect", post(routes::connect))
        .route("/channels/{id}/disconnect", post(routes::disconnect))
        .route("/channels/{id}/capture/start", post(routes::start_capture))
        .route("/channels/{id}/capture/stop", post(routes::stop_capture))
        .route("/channels/{id}/upload", put(routes::set_upload))
        .route("/channels/{id}/forward/start", post(routes::start_forward))
        .route("/channels/{id}/forward/stop", post(routes::stop_forward))
        .route("/connect", get(batch::connect_all).post(batch::connect_all))
        .route("/capture", get(batch::capture_all).post(batch::capture_all))
        .route(
            "/stop_capture",
            get(batch::stop_capture_all).post(batch::stop_capture_all),
        )
        .with_state(state)
}

/// Serve the control API until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: ControlState, shutdown: F) -> CamlinkResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Control API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Control API stopped");
    Ok(())
}
