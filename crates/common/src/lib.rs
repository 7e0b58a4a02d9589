//! Camlink Common Utilities
//!
//! Shared infrastructure for all Camlink crates:
//! - Error types and result aliases
//! - Clock helpers for upload timestamps and capture session naming
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
