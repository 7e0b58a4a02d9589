//! Mapping of engine errors onto HTTP replies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use camlink_common::error::CamlinkError;
use serde_json::json;

/// Error reply: `{"success": false, "error": "..."}` with a matching status.
#[derive(Debug)]
pub struct ApiError(pub CamlinkError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CamlinkError::ChannelNotFound { .. } => StatusCode::NOT_FOUND,
            CamlinkError::Config { .. } => StatusCode::BAD_REQUEST,
            CamlinkError::Forward { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CamlinkError> for ApiError {
    fn from(err: CamlinkError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self.0, "Control request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "Control request rejected");
        }
        (
            status,
            Json(json!({ "success": false, "error": self.0.to_string() })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CamlinkError::channel_not_found(9), StatusCode::NOT_FOUND),
            (CamlinkError::config("no source"), StatusCode::BAD_REQUEST),
            (CamlinkError::forward("refused"), StatusCode::BAD_GATEWAY),
            (CamlinkError::timeout("batch"), StatusCode::INTERNAL_SERVER_ERROR),
            (CamlinkError::transcoder("spawn"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
