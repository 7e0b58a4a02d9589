//! Capture lifecycle: frame files written into a session directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use camlink_common::clock::absolute_path;
use camlink_common::error::{CamlinkError, CamlinkResult};
use camlink_transcoder::{Invocation, ProcessSpawner, TranscoderProcess};

use crate::watcher::FrameWatcher;

/// One running capture of a channel.
pub(crate) struct CaptureSession {
    dir: PathBuf,
    process: TranscoderProcess,
    watcher: FrameWatcher,
}

impl CaptureSession {
    /// Create `dir`, start watching it, then start the transcoder.
    ///
    /// The watcher's snapshot is taken before the transcoder exists, so
    /// every frame it writes is reported to `on_frame`.
    pub(crate) async fn start<F>(
        label: &str,
        spawner: &dyn ProcessSpawner,
        source: &str,
        dir: &Path,
        fps: Option<u32>,
        scan_interval: Duration,
        on_frame: F,
    ) -> CamlinkResult<Self>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let dir = absolute_path(dir)?;
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            CamlinkError::capture(format!(
                "Failed to create capture directory {}: {e}",
                dir.display()
            ))
        })?;

        let mut watcher = FrameWatcher::start(dir.clone(), scan_interval, on_frame).await;

        let invocation = Invocation::capture(source, &dir, fps);
        let mut process = match spawner.spawn(label, &invocation) {
            Ok(process) => process,
            Err(e) => {
                watcher.stop();
                return Err(e);
            }
        };

        // An exit on its own is only logged; the session stays until stopped.
        if let Some(exit) = process.take_exit() {
            let label = label.to_string();
            tokio::spawn(async move {
                if let Ok(exit) = exit.await {
                    if !exit.is_killed() {
                        tracing::warn!(process = %label, ?exit, "Capture transcoder ended on its own");
                    }
                }
            });
        }

        tracing::info!(process = %label, dir = %dir.display(), fps = ?fps, "Capture started");
        Ok(Self {
            dir,
            process,
            watcher,
        })
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    /// Kill the transcoder and stop watching. Written frames are kept.
    pub(crate) fn stop(mut self) -> PathBuf {
        self.process.kill();
        self.watcher.stop();
        self.dir
    }
}
