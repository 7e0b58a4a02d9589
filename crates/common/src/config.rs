//! Application configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CamlinkError, CamlinkResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Channel table. Ids and relay ports must be unique.
    pub channels: Vec<ChannelConfig>,

    /// External transcoder settings.
    pub transcoder: TranscoderConfig,

    /// Viewer fan-out settings.
    pub relay: RelayConfig,

    /// Frame capture settings.
    pub capture: CaptureConfig,

    /// Initial upload settings applied to every channel.
    pub upload: UploadDefaults,

    /// Control API settings.
    pub control: ControlConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// One physical camera source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Stable channel id.
    pub id: u32,

    /// Port the viewer endpoint listens on.
    pub relay_port: u16,

    /// Source URL used by batch operations and as a fallback for
    /// per-channel requests that omit one.
    #[serde(default)]
    pub source_url: Option<String>,
}

/// Transcoder invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Transcoder executable (looked up on `PATH` when not absolute).
    pub program: PathBuf,

    /// Video bitrate of the relay encode.
    pub relay_bitrate: String,

    /// Output frame rate of the relay encode.
    pub relay_fps: u32,
}

/// Viewer endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Interface the viewer endpoints bind to.
    pub bind_host: String,

    /// Host name handed back to callers in viewer URLs.
    pub public_host: String,

    /// Chunks buffered per viewer before a slow viewer starts missing data.
    pub fanout_capacity: usize,

    /// Read size for the relay transcoder's output.
    pub chunk_size: usize,
}

/// Frame capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Base directory for batch-started capture sessions.
    pub base_dir: PathBuf,

    /// UTC offset (hours) used to name session directories.
    pub utc_offset_hours: i32,

    /// Directory scan interval for new frames (milliseconds).
    pub scan_interval_ms: u64,
}

/// Upload defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadDefaults {
    /// Whether uploads start enabled.
    pub enabled: bool,

    /// Collector endpoint frames are posted to.
    pub collector_url: Option<String>,

    /// Delay before reading a freshly discovered frame (milliseconds).
    pub settle_delay_ms: u64,
}

/// Control API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Listen address of the control API.
    pub bind: String,

    /// Upper bound for batch capture start (seconds).
    pub batch_timeout_secs: u64,

    /// Remote ingest service used when a forward request names none.
    pub remote_url: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "camlink_engine=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            transcoder: TranscoderConfig::default(),
            relay: RelayConfig::default(),
            capture: CaptureConfig::default(),
            upload: UploadDefaults::default(),
            control: ControlConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            relay_bitrate: "1000k".to_string(),
            relay_fps: 25,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            public_host: "localhost".to_string(),
            fanout_capacity: 16,
            chunk_size: 32 * 1024,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            base_dir: dirs_default_captures(),
            utc_offset_hours: 8,
            scan_interval_ms: 50,
        }
    }
}

impl Default for UploadDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            collector_url: None,
            settle_delay_ms: 100,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:12345".to_string(),
            batch_timeout_secs: 10,
            remote_url: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path.
    pub fn load_from(path: &Path) -> CamlinkResult<Self> {
        if !path.exists() {
            return Err(CamlinkError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Check the channel table: at least one channel, ids and relay ports
    /// pairwise distinct.
    pub fn validate(&self) -> CamlinkResult<()> {
        if self.channels.is_empty() {
            return Err(CamlinkError::config("No channels configured"));
        }

        let mut ids = HashSet::new();
        let mut ports = HashSet::new();
        for channel in &self.channels {
            if !ids.insert(channel.id) {
                return Err(CamlinkError::config(format!(
                    "Duplicate channel id {}",
                    channel.id
                )));
            }
            // The viewer endpoint is fixed for the life of the channel, so
            // an OS-assigned port is not allowed.
            if channel.relay_port == 0 {
                return Err(CamlinkError::config(format!(
                    "Channel {} needs a fixed relay port",
                    channel.id
                )));
            }
            if !ports.insert(channel.relay_port) {
                return Err(CamlinkError::config(format!(
                    "Relay port {} is assigned to more than one channel",
                    channel.relay_port
                )));
            }
        }

        if self.relay.fanout_capacity == 0 {
            return Err(CamlinkError::config("relay.fanout_capacity must be > 0"));
        }
        if self.relay.chunk_size == 0 {
            return Err(CamlinkError::config("relay.chunk_size must be > 0"));
        }

        Ok(())
    }

    /// Look up a channel entry by id.
    pub fn channel(&self, id: u32) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.id == id)
    }
}

/// The reference deployment: four channels on ports 9901-9904.
fn default_channels() -> Vec<ChannelConfig> {
    (1..=4)
        .map(|id| ChannelConfig {
            id,
            relay_port: 9900 + id as u16,
            source_url: None,
        })
        .collect()
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("camlink").join("config.json")
}

/// Default capture directory.
fn dirs_default_captures() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("camlink").join("captures")
}
