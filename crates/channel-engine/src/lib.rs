//! Camlink Channel Engine
//!
//! Per-channel orchestration of camera sources. Each channel runs three
//! independent lifecycles, each backed by at most one transcoder process:
//!
//! ```text
//!                      ┌──► relay ───► BroadcastTransport ──► viewers (ws)
//!  source URL ─► Channel ─► capture ─► session dir ─► FrameWatcher
//!                      │                                   │
//!                      │                        UploadPipeline ──► collector
//!                      └──► forward ─► handshake ─► tcp://ingest:port
//! ```
//!
//! The [`ChannelRegistry`] owns a fixed table of channels and is the entry
//! point for callers.

pub mod broadcast;
pub(crate) mod capture;
pub mod channel;
pub mod forward;
pub mod ingest;
pub mod registry;
pub mod relay;
pub mod upload;
pub mod watcher;

pub use broadcast::{BroadcastTransport, STREAM_PREAMBLE};
pub use channel::{Channel, ChannelStatus};
pub use forward::{ForwardSession, ForwardState};
pub use ingest::IngestClient;
pub use registry::{ChannelRegistry, EngineSettings};
pub use relay::RelayInfo;
pub use upload::{UploadConfig, UploadPipeline, UploadStats};
pub use watcher::FrameWatcher;
