//! In-memory spawner for exercising process lifecycles without a transcoder.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camlink_common::error::{CamlinkError, CamlinkResult};
use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;

use crate::process::{KillSwitch, ProcessExit, ProcessOutput, ProcessSpawner, TranscoderProcess};
use crate::profile::{Invocation, ProfileKind};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Test-side view of one fake process.
#[derive(Clone)]
pub struct FakeProcess {
    pub label: String,
    pub invocation: Invocation,
    alive: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
    exit_tx: Arc<Mutex<Option<oneshot::Sender<ProcessExit>>>>,
    stdout: Arc<tokio::sync::Mutex<Option<DuplexStream>>>,
}

impl FakeProcess {
    pub fn kind(&self) -> ProfileKind {
        self.invocation.kind
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Write bytes to the process's standard output. Returns false once the
    /// process is gone or the reader is.
    pub async fn emit(&self, bytes: &[u8]) -> bool {
        if !self.is_alive() {
            return false;
        }
        let mut guard = self.stdout.lock().await;
        match guard.as_mut() {
            Some(writer) => writer.write_all(bytes).await.is_ok(),
            None => false,
        }
    }

    /// Simulate the process ending on its own.
    pub async fn exit(&self, code: i32) {
        self.finish(ProcessExit::Exited { code: Some(code) });
        // Close stdout so readers see end of stream.
        self.stdout.lock().await.take();
    }

    fn finish(&self, exit: ProcessExit) {
        let tx = self.exit_tx.lock().take();
        let Some(tx) = tx else {
            return;
        };
        if exit.is_killed() {
            self.killed.store(true, Ordering::SeqCst);
        }
        self.alive.store(false, Ordering::SeqCst);
        if let Ok(mut stdout) = self.stdout.try_lock() {
            stdout.take();
        }
        let _ = tx.send(exit);
    }
}

impl std::fmt::Debug for FakeProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeProcess")
            .field("label", &self.label)
            .field("kind", &self.invocation.kind)
            .field("alive", &self.is_alive())
            .field("killed", &self.was_killed())
            .finish()
    }
}

/// Records every invocation and hands out controllable fake processes.
#[derive(Default)]
pub struct FakeSpawner {
    processes: Mutex<Vec<FakeProcess>>,
    failures: Mutex<Vec<ProfileKind>>,
}

impl FakeSpawner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next spawn of `kind` fail.
    pub fn fail_next(&self, kind: ProfileKind) {
        self.failures.lock().push(kind);
    }

    /// Every process spawned so far, oldest first.
    pub fn processes(&self) -> Vec<FakeProcess> {
        self.processes.lock().clone()
    }

    /// Processes of one kind, oldest first.
    pub fn spawned(&self, kind: ProfileKind) -> Vec<FakeProcess> {
        self.processes
            .lock()
            .iter()
            .filter(|p| p.kind() == kind)
            .cloned()
            .collect()
    }

    /// Number of live processes of one kind.
    pub fn alive(&self, kind: ProfileKind) -> usize {
        self.spawned(kind).iter().filter(|p| p.is_alive()).count()
    }

    /// The most recent process of one kind.
    pub fn last(&self, kind: ProfileKind) -> Option<FakeProcess> {
        self.spawned(kind).pop()
    }
}

impl ProcessSpawner for FakeSpawner {
    fn spawn(&self, label: &str, invocation: &Invocation) -> CamlinkResult<TranscoderProcess> {
        {
            let mut failures = self.failures.lock();
            if let Some(pos) = failures.iter().position(|k| *k == invocation.kind) {
                failures.remove(pos);
                return Err(CamlinkError::transcoder(format!(
                    "Simulated spawn failure for {label}"
                )));
            }
        }

        let (exit_tx, exit_rx) = oneshot::channel();

        let (stdout, writer) = if invocation.kind == ProfileKind::Relay {
            let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
            (Some(Box::pin(reader) as ProcessOutput), Some(writer))
        } else {
            (None, None)
        };

        let fake = FakeProcess {
            label: label.to_string(),
            invocation: invocation.clone(),
            alive: Arc::new(AtomicBool::new(true)),
            killed: Arc::new(AtomicBool::new(false)),
            exit_tx: Arc::new(Mutex::new(Some(exit_tx))),
            stdout: Arc::new(tokio::sync::Mutex::new(writer)),
        };

        let target = fake.clone();
        let kill: KillSwitch = Box::new(move || target.finish(ProcessExit::Killed));

        self.processes.lock().push(fake);
        Ok(TranscoderProcess::from_parts(
            label, None, stdout, kill, exit_rx,
        ))
    }

    fn program(&self) -> &Path {
        Path::new("fake-transcoder")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_fake_relay_streams_and_dies_on_drop() {
        let spawner = FakeSpawner::new();
        let mut process = spawner
            .spawn("ch1-relay", &Invocation::relay("rtsp://cam/1", &Default::default()))
            .unwrap();
        let mut stdout = process.take_stdout().unwrap();
        let exit = process.take_exit().unwrap();

        let fake = spawner.last(ProfileKind::Relay).unwrap();
        assert!(fake.emit(b"abc").await);
        let mut buf = [0u8; 3];
        stdout.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");

        drop(process);
        assert_eq!(exit.await.unwrap(), ProcessExit::Killed);
        assert!(fake.was_killed());
        assert!(!fake.is_alive());
        assert!(!fake.emit(b"late").await);
    }

    #[tokio::test]
    async fn test_fake_exit_is_not_a_kill() {
        let spawner = FakeSpawner::new();
        let mut process = spawner
            .spawn(
                "ch2-capture",
                &Invocation::capture("rtsp://cam/2", Path::new("/tmp"), None),
            )
            .unwrap();
        let exit = process.take_exit().unwrap();

        let fake = spawner.last(ProfileKind::Capture).unwrap();
        fake.exit(1).await;
        assert_eq!(exit.await.unwrap(), ProcessExit::Exited { code: Some(1) });
        assert!(!fake.was_killed());

        // Dropping the handle after a natural exit changes nothing.
        drop(process);
        assert!(!fake.was_killed());
    }

    #[tokio::test]
    async fn test_fail_next_applies_once_per_kind() {
        let spawner = FakeSpawner::new();
        spawner.fail_next(ProfileKind::Forward);

        let forward = Invocation::forward("rtsp://cam/3", "ingest", 4000);
        assert!(spawner.spawn("ch3-forward", &forward).is_err());
        let _relay = spawner
            .spawn("ch3-relay", &Invocation::relay("rtsp://cam/3", &Default::default()))
            .unwrap();
        let _forward = spawner.spawn("ch3-forward", &forward).unwrap();

        assert_eq!(spawner.alive(ProfileKind::Forward), 1);
        assert_eq!(spawner.processes().len(), 2);
    }
}
