//! Polling watcher for frames appearing in a capture directory.
//!
//! The transcoder numbers frames sequentially, so a scan only has to look
//! for the next expected name. The directory is listed in full once at
//! start, and again only when the sequence stalls (a skipped number), so
//! the cost of a tick does not grow with the length of the capture.

use std::path::{Path, PathBuf};
use std::time::Duration;

use camlink_transcoder::{frame_file_name, frame_index, FIRST_FRAME_INDEX};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Idle ticks before the directory is listed again to look past a gap.
const RESYNC_IDLE_TICKS: u32 = 20;

/// Reports each frame newly created in a directory exactly once, in index
/// order.
///
/// Frames already present when the watcher starts are not reported, and
/// files that are not transcoder frames are ignored.
pub struct FrameWatcher {
    dir: PathBuf,
    task: Option<JoinHandle<()>>,
}

impl FrameWatcher {
    /// Find the highest frame in `dir`, then poll it every `interval`.
    ///
    /// The snapshot is complete when this returns, so frames the caller
    /// causes to appear afterwards are always reported.
    pub async fn start<F>(dir: impl Into<PathBuf>, interval: Duration, on_created: F) -> Self
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let dir = dir.into();
        let mut next = frames_from(&dir, 0)
            .await
            .last()
            .map_or(FIRST_FRAME_INDEX, |highest| highest + 1);

        let scan_dir = dir.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut idle = 0;
            loop {
                ticker.tick().await;

                let mut found = false;
                loop {
                    let path = scan_dir.join(frame_file_name(next));
                    if !is_file(&path).await {
                        break;
                    }
                    on_created(path);
                    next += 1;
                    found = true;
                }
                if found {
                    idle = 0;
                    continue;
                }

                idle += 1;
                if idle < RESYNC_IDLE_TICKS {
                    continue;
                }
                idle = 0;
                for index in frames_from(&scan_dir, next).await {
                    tracing::debug!(
                        dir = %scan_dir.display(),
                        expected = next,
                        found = index,
                        "Frame sequence skipped ahead"
                    );
                    on_created(scan_dir.join(frame_file_name(index)));
                    next = index + 1;
                }
            }
        });

        tracing::debug!(dir = %dir.display(), next, "Frame watcher started");
        Self {
            dir,
            task: Some(task),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(dir = %self.dir.display(), "Frame watcher stopped");
        }
    }
}

impl Drop for FrameWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

/// Sorted indices of the frames in `dir` numbered `min` or above. An
/// unreadable directory yields none.
async fn frames_from(dir: &Path, min: u64) -> Vec<u64> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut indices: Vec<u64> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| frame_index(entry.file_name().to_str()?))
            .filter(|index| *index >= min)
            .collect();
        indices.sort_unstable();
        indices
    })
    .await
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    async fn collected_after(seen: &Arc<Mutex<Vec<PathBuf>>>, n: usize) -> Vec<PathBuf> {
        for _ in 0..200 {
            if seen.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        seen.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_reports_new_files_once_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame_00000000.jpg"), b"old").unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut watcher = FrameWatcher::start(dir.path(), Duration::from_millis(20), move |p| {
            sink.lock().unwrap().push(p)
        })
        .await;

        for i in [2, 1, 3] {
            std::fs::write(dir.path().join(format!("frame_0000000{i}.jpg")), b"x").unwrap();
        }
        let got = collected_after(&seen, 3).await;
        let names: Vec<_> = got
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["frame_00000001.jpg", "frame_00000002.jpg", "frame_00000003.jpg"]
        );

        // No duplicates on later scans.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(seen.lock().unwrap().len(), 3);

        watcher.stop();
        std::fs::write(dir.path().join("frame_00000004.jpg"), b"x").unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_directory_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not-yet");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _watcher = FrameWatcher::start(&missing, Duration::from_millis(10), move |p| {
            sink.lock().unwrap().push(p)
        })
        .await;

        tokio::fs::create_dir(&missing).await.unwrap();
        tokio::fs::write(missing.join("frame_00000001.jpg"), b"x").await.unwrap();
        assert_eq!(collected_after(&seen, 1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_skipped_frame_number_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _watcher = FrameWatcher::start(dir.path(), Duration::from_millis(5), move |p| {
            sink.lock().unwrap().push(p)
        })
        .await;

        std::fs::write(dir.path().join(frame_file_name(1)), b"x").unwrap();
        std::fs::write(dir.path().join(frame_file_name(3)), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let got = collected_after(&seen, 2).await;
        assert_eq!(
            got,
            vec![
                dir.path().join(frame_file_name(1)),
                dir.path().join(frame_file_name(3)),
            ]
        );

        std::fs::write(dir.path().join(frame_file_name(4)), b"x").unwrap();
        assert_eq!(collected_after(&seen, 3).await.len(), 3);
    }

    #[tokio::test]
    async fn test_long_capture_only_reports_new_frames() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=5_000 {
            std::fs::write(dir.path().join(frame_file_name(i)), b"").unwrap();
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _watcher = FrameWatcher::start(dir.path(), Duration::from_millis(10), move |p| {
            sink.lock().unwrap().push(p)
        })
        .await;

        std::fs::write(dir.path().join(frame_file_name(5_001)), b"x").unwrap();
        std::fs::write(dir.path().join(frame_file_name(5_002)), b"x").unwrap();
        let got = collected_after(&seen, 2).await;
        assert_eq!(
            got,
            vec![
                dir.path().join(frame_file_name(5_001)),
                dir.path().join(frame_file_name(5_002)),
            ]
        );
    }

    #[tokio::test]
    async fn test_frames_from_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_00000007.jpg", "frame_00000002.jpg", "frame_00000005.jpg", "x.jpg"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        assert_eq!(frames_from(dir.path(), 0).await, vec![2, 5, 7]);
        assert_eq!(frames_from(dir.path(), 5).await, vec![5, 7]);
        assert!(frames_from(&dir.path().join("missing"), 0).await.is_empty());
    }
}
