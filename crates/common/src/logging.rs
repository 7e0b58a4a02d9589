//! Tracing setup for the binaries.
//!
//! `config.level` accepts a bare level or a full directive list, e.g.
//! `info,camlink::transcoder=error` to silence drained transcoder output.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{CamlinkError, CamlinkResult};

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_logging(config: &LoggingConfig) -> CamlinkResult<()> {
    let filter = build_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), &config.level);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| CamlinkError::config(format!("Failed to install logger: {e}")))
}

/// Resolve the filter: environment directives first, then the configured
/// level, then `info`.
fn build_filter(env: Option<String>, level: &str) -> EnvFilter {
    if let Some(directives) = env.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(&directives) {
            Ok(filter) => return filter,
            Err(e) => eprintln!("Ignoring invalid {}: {e}", EnvFilter::DEFAULT_ENV),
        }
    }
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("Invalid logging.level {level:?} ({e}), using info");
        EnvFilter::new("info")
    })
}
