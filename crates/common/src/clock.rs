//! Clock helpers.
//!
//! Upload requests carry wall-clock epoch milliseconds, and capture sessions
//! are named after the local time of the deployment (a fixed UTC offset, not
//! the host timezone), so directories sort the same way on every machine.

use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Milliseconds since the Unix epoch, as sent in upload requests.
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format a session timestamp (`YYYY-MM-DD_HH-MM`) in the given UTC offset.
///
/// Offsets outside ±23 hours fall back to UTC.
pub fn session_stamp(now: DateTime<Utc>, utc_offset_hours: i32) -> String {
    let offset = utc_offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| {
            tracing::warn!(utc_offset_hours, "Invalid UTC offset, using UTC");
            Utc.fix()
        });
    now.with_timezone(&offset).format("%Y-%m-%d_%H-%M").to_string()
}

/// Session directory for a capture: `<base>/CH<channel>/<stamp>`.
pub fn session_dir(
    base: &Path,
    channel: u32,
    now: DateTime<Utc>,
    utc_offset_hours: i32,
) -> PathBuf {
    base.join(format!("CH{channel}"))
        .join(session_stamp(now, utc_offset_hours))
}

/// Resolve a possibly relative path against the working directory.
pub fn absolute_path(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
