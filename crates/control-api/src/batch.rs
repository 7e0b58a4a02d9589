//! Batch routes for automation clients: act on every configured channel.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::Json;
use camlink_common::clock::session_dir;
use camlink_common::error::CamlinkError;
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::ControlState;

#[derive(Debug, Default, Deserialize)]
pub struct CaptureQuery {
    pub fps: Option<u32>,
}

/// Channels with a configured source, as `(id, source)`.
fn sourced_channels(state: &ControlState) -> Vec<(u32, String)> {
    state
        .registry
        .ids()
        .into_iter()
        .filter_map(|id| {
            state
                .config
                .channel(id)
                .and_then(|entry| entry.source_url.clone())
                .map(|source| (id, source))
        })
        .collect()
}

/// Connect every channel that has a configured source.
pub async fn connect_all(State(state): State<ControlState>) -> Json<Value> {
    let channels = sourced_channels(&state);
    let results = join_all(channels.iter().map(|(id, source)| {
        let registry = &state.registry;
        async move {
            let result = match registry.connect(*id, source).await {
                Ok(relay) => json!({ "success": true, "relay_url": relay.url }),
                Err(e) => {
                    tracing::warn!(channel = id, error = %e, "Batch connect failed");
                    json!({ "success": false, "error": e.to_string() })
                }
            };
            (*id, result)
        }
    }))
    .await;

    let results: BTreeMap<u32, Value> = results.into_iter().collect();
    Json(json!({
        "success": true,
        "message": "Connect signal sent",
        "channels": results,
    }))
}

/// Start a capture session on every sourced channel, within the batch timeout.
///
/// `paths` covers every channel (null where none is capturing) and
/// `channels` reports the outcome of each start that was attempted.
pub async fn capture_all(
    State(state): State<ControlState>,
    Query(query): Query<CaptureQuery>,
) -> ApiResult<Json<Value>> {
    let channels = sourced_channels(&state);
    let now = chrono::Utc::now();
    let base = state.config.capture.base_dir.clone();
    let offset = state.config.capture.utc_offset_hours;
    let limit = Duration::from_secs(state.config.control.batch_timeout_secs);
    let fps = query.fps;

    let starts = join_all(channels.iter().map(|(id, source)| {
        let registry = &state.registry;
        let dir = session_dir(&base, *id, now, offset);
        async move {
            let outcome = match registry.start_capture(*id, source, &dir, fps).await {
                Ok(path) => json!({ "success": true, "path": path }),
                Err(e) => {
                    tracing::warn!(channel = id, error = %e, "Batch capture start failed");
                    json!({ "success": false, "error": e.to_string() })
                }
            };
            (*id, outcome)
        }
    }));
    let results: BTreeMap<u32, Value> = within_batch_timeout(limit, starts)
        .await?
        .into_iter()
        .collect();

    let mut paths: BTreeMap<u32, Option<PathBuf>> = BTreeMap::new();
    for channel in state.registry.channels() {
        paths.insert(channel.id(), channel.capture_dir().await);
    }

    Ok(Json(json!({
        "success": true,
        "message": "Capture started",
        "fps": fps,
        "paths": paths,
        "channels": results,
    })))
}

/// Run `work`, failing with a timeout error once `limit` has passed.
async fn within_batch_timeout<F: Future>(limit: Duration, work: F) -> ApiResult<F::Output> {
    tokio::time::timeout(limit, work).await.map_err(|_| {
        CamlinkError::timeout(format!(
            "Captures did not start within {}s",
            limit.as_secs()
        ))
        .into()
    })
}

/// Stop capture on every channel.
pub async fn stop_capture_all(State(state): State<ControlState>) -> Json<Value> {
    join_all(state.registry.channels().iter().map(|channel| async move {
        if let Err(e) = channel.stop_capture().await {
            tracing::warn!(channel = channel.id(), error = %e, "Batch capture stop failed");
        }
    }))
    .await;

    Json(json!({ "success": true, "message": "Stop capture signal sent" }))
}
