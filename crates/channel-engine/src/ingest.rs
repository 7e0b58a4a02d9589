//! Client side of the remote ingest service's control endpoint.
//!
//! ```text
//! POST {base}/start_capture {"channel_id": n}  →  {"success": true, "port": p}
//! POST {base}/stop_capture  {"channel_id": n}  →  (ignored)
//! ```

use camlink_common::error::{CamlinkError, CamlinkResult};
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct StartCaptureReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IngestClient {
    client: reqwest::Client,
}

impl IngestClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the ingest service to allocate a port for `channel`.
    pub async fn start_capture(&self, base_url: &str, channel: u32) -> CamlinkResult<u16> {
        let url = format!("{}/start_capture", normalize_base_url(base_url));
        let response = self
            .client
            .post(&url)
            .json(&json!({ "channel_id": channel }))
            .send()
            .await
            .map_err(|e| CamlinkError::forward(format!("Handshake with {url} failed: {e}")))?;

        // The service reports refusals in the body, whatever the status code.
        let status = response.status();
        let reply: StartCaptureReply = response.json().await.map_err(|e| {
            CamlinkError::forward(format!("Unreadable handshake reply from {url} ({status}): {e}"))
        })?;

        if !reply.success {
            return Err(CamlinkError::forward(reply.error.unwrap_or_else(|| {
                format!("Ingest service refused channel {channel}")
            })));
        }
        match reply.port {
            Some(port) if port != 0 => Ok(port),
            _ => Err(CamlinkError::forward(format!(
                "Ingest service allocated no port for channel {channel}"
            ))),
        }
    }

    /// Tell the ingest service the stream for `channel` has ended.
    pub async fn stop_capture(&self, base_url: &str, channel: u32) -> CamlinkResult<()> {
        let url = format!("{}/stop_capture", normalize_base_url(base_url));
        self.client
            .post(&url)
            .json(&json!({ "channel_id": channel }))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| CamlinkError::forward(format!("Stop notification to {url} failed: {e}")))?;
        Ok(())
    }
}

/// Base URL without trailing slashes.
pub fn normalize_base_url(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

/// Host the forward stream is sent to, taken from the ingest base URL.
pub fn remote_host(base_url: &str) -> CamlinkResult<String> {
    let url = Url::parse(normalize_base_url(base_url))
        .map_err(|e| CamlinkError::config(format!("Invalid remote URL {base_url:?}: {e}")))?;
    url.host_str()
        .map(str::to_string)
        .ok_or_else(|| CamlinkError::config(format!("Remote URL {base_url:?} has no host")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/")
    }

    #[test]
    fn test_base_url_helpers() {
        assert_eq!(normalize_base_url("http://ingest:5000//"), "http://ingest:5000");
        assert_eq!(remote_host("http://192.168.1.20:5000/").unwrap(), "192.168.1.20");
        assert_eq!(remote_host("https://ingest.example.org").unwrap(), "ingest.example.org");
        assert!(matches!(
            remote_host("not a url"),
            Err(CamlinkError::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_handshake_returns_port() {
        let app = Router::new().route(
            "/start_capture",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["channel_id"], 3);
                Json(json!({ "success": true, "port": 41003 }))
            }),
        );
        let base = serve(app).await;
        let port = IngestClient::new().start_capture(&base, 3).await.unwrap();
        assert_eq!(port, 41003);
    }

    #[tokio::test]
    async fn test_handshake_refusal_carries_remote_error() {
        let app = Router::new().route(
            "/start_capture",
            post(|| async {
                (
                    axum::http::StatusCode::CONFLICT,
                    Json(json!({ "success": false, "error": "Channel busy" })),
                )
            }),
        );
        let base = serve(app).await;
        let err = IngestClient::new().start_capture(&base, 1).await.unwrap_err();
        assert!(matches!(err, CamlinkError::Forward { .. }));
        assert!(err.to_string().contains("Channel busy"));
    }

    #[tokio::test]
    async fn test_handshake_without_port_fails() {
        let app = Router::new().route(
            "/start_capture",
            post(|| async { Json(json!({ "success": true })) }),
        );
        let base = serve(app).await;
        assert!(IngestClient::new().start_capture(&base, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_notification_failure_is_error() {
        let app = Router::new().route(
            "/stop_capture",
            post(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = serve(app).await;
        assert!(IngestClient::new().stop_capture(&base, 1).await.is_err());
    }
}
