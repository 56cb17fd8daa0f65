//! Device against the real dispatch server on localhost.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use glimpse_core::{ConnectionInfo, GlimpseError, Mode, ModeController};
use glimpse_device::{
    CaptureProvider, CaptureSession, Device, LineTrigger, NullPlayback, SessionOptions, Strategy,
};
use glimpse_device::DeviceEvent;
use glimpse_device::auto::spawn_auto_capture;
use glimpse_device::trigger::spawn_trigger;
use glimpse_server::{
    DispatchOptions, DispatchServer, HandlerRegistry, InferenceBackend, Reply, serve_connection,
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

// ── Helpers ──────────────────────────────────────────────────────

struct Camera;

#[async_trait]
impl CaptureProvider for Camera {
    async fn acquire(&mut self, mode: Mode) -> Result<Bytes, GlimpseError> {
        Ok(Bytes::from(format!("jpeg/{mode}")))
    }
}

/// Records the mode of every request; optionally flips the device's
/// mode while the request is being handled.
struct Recorder {
    seen: Mutex<Vec<Mode>>,
    flip: Option<ModeController>,
}

impl Recorder {
    fn new(flip: Option<ModeController>) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            flip,
        })
    }
}

#[async_trait]
impl InferenceBackend for Recorder {
    async fn handle(&self, mode: Mode, _image: Bytes) -> Result<Reply, GlimpseError> {
        self.seen.lock().await.push(mode);
        if let Some(controller) = &self.flip {
            controller.toggle();
        }
        Ok(Reply::new(mode.name(), mode.name().as_bytes().to_vec()))
    }
}

struct FailOnce(AtomicUsize);

#[async_trait]
impl InferenceBackend for FailOnce {
    async fn handle(&self, _mode: Mode, _image: Bytes) -> Result<Reply, GlimpseError> {
        if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(GlimpseError::HandlerFailure("warming up".into()));
        }
        Ok(Reply::new("ok", &b"ok"[..]))
    }
}

fn both_modes(backend: Arc<dyn InferenceBackend>) -> HandlerRegistry {
    HandlerRegistry::new()
        .with(Mode::Capture, backend.clone())
        .with(Mode::Describe, backend)
}

async fn start_server(registry: HandlerRegistry) -> ConnectionInfo {
    let server = DispatchServer::bind("127.0.0.1:0", registry, DispatchOptions::default())
        .await
        .unwrap();
    let port = server.local_addr().unwrap().port();
    tokio::spawn(server.run());
    ConnectionInfo::new("127.0.0.1", port)
}

/// Serve with a hand-rolled accept loop that counts connections.
async fn start_counting_server(registry: HandlerRegistry) -> (ConnectionInfo, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    let registry = Arc::new(registry);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let registry = registry.clone();
            tokio::spawn(async move {
                let _ = serve_connection(stream, &registry, &DispatchOptions::default()).await;
            });
        }
    });
    (ConnectionInfo::new("127.0.0.1", port), accepted)
}

fn session(options: SessionOptions, controller: ModeController) -> CaptureSession {
    CaptureSession::new(options, controller, Box::new(Camera), Box::new(NullPlayback))
}

// ── Scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn mode_flip_mid_exchange_applies_to_next_exchange() {
    let controller = ModeController::new(Mode::Capture);
    let recorder = Recorder::new(Some(controller.clone()));
    let server = start_server(both_modes(recorder.clone())).await;
    let mut s = session(SessionOptions::new(server), controller.clone());

    let first = s.exchange().await.unwrap();
    assert_eq!(first.mode, Mode::Capture);
    assert_eq!(first.received, "CAPTURE".len());
    assert_eq!(controller.current(), Mode::Describe);

    let second = s.exchange().await.unwrap();
    assert_eq!(second.mode, Mode::Describe);

    assert_eq!(*recorder.seen.lock().await, vec![Mode::Capture, Mode::Describe]);
}

#[tokio::test]
async fn per_exchange_opens_one_connection_per_capture() {
    let (server, accepted) = start_counting_server(both_modes(Recorder::new(None))).await;
    let mut s = session(SessionOptions::new(server), ModeController::default());

    for _ in 0..3 {
        s.exchange().await.unwrap();
    }
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn persistent_reuses_one_connection() {
    let (server, accepted) = start_counting_server(both_modes(Recorder::new(None))).await;
    let options = SessionOptions::new(server).with_strategy(Strategy::Persistent);
    let mut s = session(options, ModeController::default());

    for _ in 0..3 {
        s.exchange().await.unwrap();
    }
    s.shutdown().await.unwrap();
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handler_failure_aborts_one_exchange_only() {
    let server = start_server(both_modes(Arc::new(FailOnce(AtomicUsize::new(0))))).await;
    let mut s = session(SessionOptions::new(server), ModeController::default());

    let err = s.exchange().await.unwrap_err();
    assert!(matches!(err, GlimpseError::TruncatedFrame { .. } | GlimpseError::Io(_)));
    assert!(s.phase().is_idle());

    let report = s.exchange().await.unwrap();
    assert_eq!(report.received, 2);
}

#[tokio::test]
async fn trigger_drives_the_device_loop() {
    let controller = ModeController::new(Mode::Capture);
    let recorder = Recorder::new(None);
    let server = start_server(both_modes(recorder.clone())).await;

    let (tx, rx) = mpsc::channel(8);
    // One capture, then a toggle that also captures, then end of input.
    let input: &[u8] = b"capture\ntoggle\n";
    spawn_trigger(LineTrigger::new(input), controller.clone(), tx, true);

    let shutdown = CancellationToken::new();
    let s = session(SessionOptions::new(server), controller);
    let device = Device::new(s, rx, shutdown.clone());
    let stats = tokio::time::timeout(Duration::from_secs(5), device.run())
        .await
        .expect("device loop did not finish");

    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 0);
    assert!(shutdown.is_cancelled());

    // The first capture may race the toggle; the second always follows it.
    let seen = recorder.seen.lock().await;
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1], Mode::Describe);
}

#[tokio::test]
async fn auto_captures_queued_before_a_mode_switch_are_dropped() {
    let controller = ModeController::new(Mode::Describe);
    let recorder = Recorder::new(None);
    let server = start_server(both_modes(recorder.clone())).await;

    let (tx, rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let period = Duration::from_millis(5);
    spawn_auto_capture(controller.clone(), Mode::Describe, period, tx.clone(), shutdown.clone());

    // Nothing consumes the queue yet, so it fills with DESCRIBE ticks.
    tokio::time::sleep(Duration::from_millis(200)).await;
    controller.set(Mode::Capture);
    tokio::spawn(async move { tx.send(DeviceEvent::Shutdown).await });

    let device = Device::new(session(SessionOptions::new(server), controller), rx, shutdown);
    let stats = tokio::time::timeout(Duration::from_secs(5), device.run())
        .await
        .expect("device loop did not finish");

    assert_eq!(stats.completed, 0);
    assert!(stats.stale >= 16, "{stats:?}");
    assert!(recorder.seen.lock().await.is_empty());
}

#[tokio::test]
async fn shutdown_interrupts_a_stalled_exchange() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    // Accepts and never answers.
    let holder = tokio::spawn(async move {
        let held = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(held);
    });

    let (tx, rx) = mpsc::channel(4);
    tx.send(DeviceEvent::Capture).await.unwrap();
    let shutdown = CancellationToken::new();
    let options = SessionOptions::new(ConnectionInfo::new("127.0.0.1", port));
    let device = Device::new(session(options, ModeController::default()), rx, shutdown.clone());
    let running = tokio::spawn(device.run());

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown.cancel();
    let stats = tokio::time::timeout(Duration::from_secs(3), running)
        .await
        .expect("device ignored shutdown")
        .unwrap();

    assert_eq!(stats.completed, 0);
    assert_eq!(stats.failed, 1);
    holder.abort();
    drop(tx);
}
