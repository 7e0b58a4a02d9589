//! Error types shared across Camlink crates.

use std::path::PathBuf;

/// Top-level error type for Camlink operations.
#[derive(Debug, thiserror::Error)]
pub enum CamlinkError {
    #[error("Channel {id} not found")]
    ChannelNotFound { id: u32 },

    #[error("Transcoder error: {message}")]
    Transcoder { message: String },

    #[error("Relay error: {message}")]
    Relay { message: String },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Upload error: {message}")]
    Upload { message: String },

    #[error("Forward error: {message}")]
    Forward { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Timed out: {message}")]
    Timeout { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using CamlinkError.
pub type CamlinkResult<T> = Result<T, CamlinkError>;

impl CamlinkError {
    pub fn channel_not_found(id: u32) -> Self {
        Self::ChannelNotFound { id }
    }

    pub fn transcoder(msg: impl Into<String>) -> Self {
        Self::Transcoder {
            message: msg.into(),
        }
    }

    pub fn relay(msg: impl Into<String>) -> Self {
        Self::Relay {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload {
            message: msg.into(),
        }
    }

    pub fn forward(msg: impl Into<String>) -> Self {
        Self::Forward {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout {
            message: msg.into(),
        }
    }

    /// Whether this error is an unknown-channel rejection.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ChannelNotFound { .. })
    }
}
