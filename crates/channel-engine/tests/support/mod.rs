//! Shared fixtures: in-process collector and ingest services, test configs.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use camlink_common::config::{AppConfig, ChannelConfig};
use camlink_engine::ChannelRegistry;
use camlink_transcoder::fake::FakeSpawner;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

/// Config with `n` loopback channels on free fixed ports and fast timings.
pub fn test_config(n: u32) -> AppConfig {
    let mut config = AppConfig::default();
    let ports = free_ports(n as usize);
    config.channels = (1..=n)
        .zip(ports)
        .map(|(id, relay_port)| ChannelConfig {
            id,
            relay_port,
            source_url: Some(format!("rtsp://cam-{id}/stream")),
        })
        .collect();
    config.relay.bind_host = "127.0.0.1".to_string();
    config.capture.scan_interval_ms = 10;
    config.upload.settle_delay_ms = 5;
    config
}

pub fn registry(config: &AppConfig) -> (ChannelRegistry, Arc<FakeSpawner>) {
    let spawner = FakeSpawner::new();
    let registry = ChannelRegistry::new(config, spawner.clone()).expect("valid test config");
    (registry, spawner)
}

/// A loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// `n` distinct loopback ports, all free a moment ago.
pub fn free_ports(n: usize) -> Vec<u16> {
    let listeners: Vec<_> = (0..n)
        .map(|_| std::net::TcpListener::bind("127.0.0.1:0").unwrap())
        .collect();
    listeners
        .iter()
        .map(|l| l.local_addr().unwrap().port())
        .collect()
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

/// One multipart request as the collector saw it.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub channel: String,
    pub timestamp: i64,
}

/// Frame collector recording uploads and the peak number in flight.
pub struct Collector {
    pub url: String,
    pub frames: Arc<Mutex<Vec<ReceivedFrame>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
}

#[derive(Clone)]
struct CollectorState {
    frames: Arc<Mutex<Vec<ReceivedFrame>>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
    hold: Duration,
}

impl Collector {
    /// Collector that answers each upload after `hold`.
    pub async fn start(hold: Duration) -> Self {
        Self::start_gated(hold, Semaphore::MAX_PERMITS).await
    }

    /// Collector whose handlers wait for [`Collector::release`].
    pub async fn start_closed() -> Self {
        Self::start_gated(Duration::ZERO, 0).await
    }

    async fn start_gated(hold: Duration, permits: usize) -> Self {
        let state = CollectorState {
            frames: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(Semaphore::new(permits)),
            hold,
        };
        let app = Router::new()
            .route("/frames", post(receive_frame))
            .with_state(state.clone());
        let addr = serve(app).await;
        Self {
            url: format!("http://{addr}/frames"),
            frames: state.frames,
            in_flight: state.in_flight,
            peak: state.peak,
            gate: state.gate,
        }
    }

    pub fn release(&self) {
        if self.gate.available_permits() == 0 {
            self.gate.add_permits(1024);
        }
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.file_name.clone())
            .collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

async fn receive_frame(State(state): State<CollectorState>, mut multipart: Multipart) -> StatusCode {
    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak.fetch_max(now, Ordering::SeqCst);

    let mut frame = ReceivedFrame {
        file_name: String::new(),
        bytes: Vec::new(),
        channel: String::new(),
        timestamp: 0,
    };
    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name().unwrap_or_default().to_string().as_str() {
            "frame" => {
                frame.file_name = field.file_name().unwrap_or_default().to_string();
                frame.bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
            }
            "channel" => frame.channel = field.text().await.unwrap_or_default(),
            "timestamp" => {
                frame.timestamp = field
                    .text()
                    .await
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or_default()
            }
            _ => {}
        }
    }

    drop(state.gate.acquire().await);
    tokio::time::sleep(state.hold).await;

    state.frames.lock().unwrap().push(frame);
    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    StatusCode::OK
}

/// Remote ingest service with scripted replies.
pub struct Ingest {
    pub url: String,
    pub start_calls: Arc<AtomicUsize>,
    pub stop_calls: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct IngestState {
    reply: Value,
    delay: Duration,
    stop_status: StatusCode,
    start_calls: Arc<AtomicUsize>,
    stop_calls: Arc<AtomicUsize>,
}

impl Ingest {
    /// Ingest service allocating `port` for every channel.
    pub async fn accepting(port: u16) -> Self {
        Self::start(json!({ "success": true, "port": port }), Duration::ZERO, StatusCode::OK).await
    }

    pub async fn refusing(error: &str) -> Self {
        Self::start(json!({ "success": false, "error": error }), Duration::ZERO, StatusCode::OK)
            .await
    }

    /// Accepts, but answers the handshake only after `delay`.
    pub async fn slow(port: u16, delay: Duration) -> Self {
        Self::start(json!({ "success": true, "port": port }), delay, StatusCode::OK).await
    }

    /// Accepts handshakes but fails every stop notification.
    pub async fn failing_stop(port: u16) -> Self {
        Self::start(
            json!({ "success": true, "port": port }),
            Duration::ZERO,
            StatusCode::INTERNAL_SERVER_ERROR,
        )
        .await
    }

    async fn start(reply: Value, delay: Duration, stop_status: StatusCode) -> Self {
        let state = IngestState {
            reply,
            delay,
            stop_status,
            start_calls: Arc::new(AtomicUsize::new(0)),
            stop_calls: Arc::new(AtomicUsize::new(0)),
        };
        let app = Router::new()
            .route("/start_capture", post(start_capture))
            .route("/stop_capture", post(stop_capture))
            .with_state(state.clone());
        let addr = serve(app).await;
        Self {
            url: format!("http://{addr}/"),
            start_calls: state.start_calls,
            stop_calls: state.stop_calls,
        }
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }
}

async fn start_capture(State(state): State<IngestState>, Json(body): Json<Value>) -> Json<Value> {
    assert!(body["channel_id"].is_u64(), "handshake must carry channel_id");
    state.start_calls.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(state.delay).await;
    Json(state.reply.clone())
}

async fn stop_capture(State(state): State<IngestState>, Json(_body): Json<Value>) -> StatusCode {
    state.stop_calls.fetch_add(1, Ordering::SeqCst);
    state.stop_status
}
