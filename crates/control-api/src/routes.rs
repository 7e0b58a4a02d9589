//! Per-channel routes.

use std::path::PathBuf;

use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::Json;
use camlink_common::clock::session_dir;
use camlink_common::error::{CamlinkError, CamlinkResult};
use camlink_engine::UploadConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::ControlState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConnectRequest {
    pub source_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CaptureRequest {
    pub source_url: Option<String>,
    /// Exact directory to write frames into.
    pub session_dir: Option<PathBuf>,
    /// Base directory; a `CH<id>/<timestamp>` session is created under it.
    pub base_dir: Option<PathBuf>,
    pub fps: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ForwardRequest {
    pub source_url: Option<String>,
    pub remote_url: Option<String>,
}

/// Channel id from the path. A malformed id is rejected with the usual
/// JSON error body.
pub struct ChannelId(pub u32);

impl<S: Send + Sync> FromRequestParts<S> for ChannelId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<u32>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| {
                CamlinkError::config(format!("Invalid channel id: {}", rejection.body_text()))
            })?;
        Ok(Self(id))
    }
}

/// Parse an optional JSON body; an empty body means all defaults.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> CamlinkResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| CamlinkError::config(format!("Invalid request body: {e}")))
}

fn ok() -> Json<Value> {
    Json(json!({ "success": true }))
}

pub async fn list_channels(State(state): State<ControlState>) -> Json<Value> {
    let channels = state.registry.statuses().await;
    Json(json!({ "success": true, "channels": channels }))
}

pub async fn channel_status(
    State(state): State<ControlState>,
    ChannelId(id): ChannelId,
) -> ApiResult<Json<Value>> {
    let status = state.registry.status(id).await?;
    Ok(Json(json!({ "success": true, "channel": status })))
}

pub async fn connect(
    State(state): State<ControlState>,
    ChannelId(id): ChannelId,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    state.registry.channel(id)?;
    let request: ConnectRequest = parse_body(&body)?;
    let source = state.source_for(id, request.source_url)?;

    let relay = state.registry.connect(id, &source).await?;
    Ok(Json(json!({
        "success": true,
        "relay_url": relay.url,
        "relay_address": relay.address,
    })))
}

pub async fn disconnect(
    State(state): State<ControlState>,
    ChannelId(id): ChannelId,
) -> ApiResult<Json<Value>> {
    state.registry.disconnect(id).await?;
    Ok(ok())
}

pub async fn start_capture(
    State(state): State<ControlState>,
    ChannelId(id): ChannelId,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    state.registry.channel(id)?;
    let request: CaptureRequest = parse_body(&body)?;
    let source = state.source_for(id, request.source_url)?;

    let dir = match request.session_dir {
        Some(dir) => dir,
        None => {
            let base = request
                .base_dir
                .unwrap_or_else(|| state.config.capture.base_dir.clone());
            session_dir(
                &base,
                id,
                chrono::Utc::now(),
                state.config.capture.utc_offset_hours,
            )
        }
    };

    let path = state
        .registry
        .start_capture(id, &source, &dir, request.fps)
        .await?;
    Ok(Json(json!({ "success": true, "path": path })))
}

pub async fn stop_capture(
    State(state): State<ControlState>,
    ChannelId(id): ChannelId,
) -> ApiResult<Json<Value>> {
    state.registry.stop_capture(id).await?;
    Ok(ok())
}

pub async fn set_upload(
    State(state): State<ControlState>,
    ChannelId(id): ChannelId,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    state.registry.channel(id)?;
    let config: UploadConfig = parse_body(&body)?;
    state.registry.set_upload_config(id, config)?;
    Ok(ok())
}

pub async fn start_forward(
    State(state): State<ControlState>,
    ChannelId(id): ChannelId,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    state.registry.channel(id)?;
    let request: ForwardRequest = parse_body(&body)?;
    let source = state.source_for(id, request.source_url)?;
    let remote = request
        .remote_url
        .or_else(|| state.config.control.remote_url.clone())
        .ok_or_else(|| CamlinkError::config("No remote ingest URL given or configured"))?;

    let forward = state.registry.start_forward(id, &source, &remote).await?;
    Ok(Json(json!({ "success": true, "forward": forward })))
}

pub async fn stop_forward(
    State(state): State<ControlState>,
    ChannelId(id): ChannelId,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    state.registry.channel(id)?;
    let request: ForwardRequest = parse_body(&body)?;
    state
        .registry
        .stop_forward(id, request.remote_url.as_deref())
        .await?;
    Ok(ok())
}
