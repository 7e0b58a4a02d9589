//! Camlink Transcoder Adapter
//!
//! Thin orchestration over an external command-line transcoder (ffmpeg).
//! Each logical task of a channel (relay, capture, forward) maps to exactly
//! one transcoder invocation built from a fixed profile.
//!
//! # Architecture
//!
//! ```text
//!  source URL ──► Invocation (profile args) ──► ProcessSpawner
//!                                                   │
//!                              ┌────────────────────┼───────────────────┐
//!                              ▼                    ▼                   ▼
//!                        stdout (relay)     stderr → tracing      exit / kill
//! ```
//!
//! The process is an opaque collaborator: arguments in, byte streams out,
//! and killing it is the only control signal.

#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod process;
pub mod profile;

pub use process::*;
pub use profile::*;
