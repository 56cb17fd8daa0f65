//! Capture session.
//!
//! One [`CaptureSession`] drives every exchange the device makes:
//! sample the mode, capture, send the frame, read the reply, play it.
//! The [`Strategy`] decides whether the TCP connection lives for one
//! exchange or for the whole run. Either way the wire traffic is the
//! same frames; only the placement of the termination sentinel differs.

use std::path::PathBuf;
use std::time::Duration;

use glimpse_core::{
    CaptureRecord, ConnectionInfo, ExchangePhase, FrameCodec, GlimpseError, Mode, ModeController,
    SessionPhase, TERMINATION, deadline,
};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::capture::{CaptureProvider, archive_capture};
use crate::playback::PlaybackSink;

// ── Strategy ─────────────────────────────────────────────────────

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Connect, run one exchange, send termination, close.
    #[default]
    PerExchange,
    /// Keep one connection for every exchange; terminate on shutdown.
    Persistent,
}

// ── SessionOptions ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub server: ConnectionInfo,
    pub strategy: Strategy,
    pub codec: FrameCodec,
    pub connect_timeout: Option<Duration>,
    /// Bound on waiting for a reply. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Keep a copy of every capture here.
    pub archive_dir: Option<PathBuf>,
}

impl SessionOptions {
    pub fn new(server: ConnectionInfo) -> Self {
        Self {
            server,
            strategy: Strategy::default(),
            codec: FrameCodec::default(),
            connect_timeout: None,
            read_timeout: None,
            archive_dir: None,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Summary of one completed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeReport {
    /// Mode the frame was tagged with.
    pub mode: Mode,
    /// Image bytes sent.
    pub sent: usize,
    /// Audio bytes received; 0 means the server had no result.
    pub received: usize,
    /// Whether the playback sink accepted the audio.
    pub played: bool,
}

// ── CaptureSession ───────────────────────────────────────────────

pub struct CaptureSession {
    options: SessionOptions,
    controller: ModeController,
    capture: Box<dyn CaptureProvider>,
    playback: Box<dyn PlaybackSink>,
    stream: Option<TcpStream>,
    session: SessionPhase,
    phase: ExchangePhase,
}

impl CaptureSession {
    pub fn new(
        options: SessionOptions,
        controller: ModeController,
        capture: Box<dyn CaptureProvider>,
        playback: Box<dyn PlaybackSink>,
    ) -> Self {
        Self {
            options,
            controller,
            capture,
            playback,
            stream: None,
            session: SessionPhase::default(),
            phase: ExchangePhase::default(),
        }
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    pub fn session_phase(&self) -> &SessionPhase {
        &self.session
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn strategy(&self) -> Strategy {
        self.options.strategy
    }

    pub fn controller(&self) -> &ModeController {
        &self.controller
    }

    /// Run one exchange.
    ///
    /// Any failure abandons the exchange: the connection is dropped, the
    /// session returns to idle, and the error is handed back. Nothing is
    /// retried; the next capture event starts from scratch.
    pub async fn exchange(&mut self) -> Result<ExchangeReport, GlimpseError> {
        match self.run_exchange().await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!("exchange aborted in {}: {e}", self.phase);
                self.phase.fail();
                self.drop_connection();
                self.phase.recover()?;
                Err(e)
            }
        }
    }

    async fn run_exchange(&mut self) -> Result<ExchangeReport, GlimpseError> {
        self.phase.begin_capture()?;
        // Sampled once: a mode change from here on applies to the next exchange.
        let mode = self.controller.current();
        let image = self.capture.acquire(mode).await?;
        let record = CaptureRecord::new(mode, image);
        info!("captured {} bytes in {mode}", record.image.len());

        if let Some(dir) = &self.options.archive_dir {
            match archive_capture(dir, &record).await {
                Ok(path) => debug!("capture archived to {}", path.display()),
                Err(e) => warn!("archiving capture failed: {e}"),
            }
        }

        self.phase.begin_send()?;
        let codec = self.options.codec;
        let frame = record.into_frame();
        let wire = codec.encode(frame.mode, &frame.payload)?;
        if self.stream.is_none() {
            self.open().await?;
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(GlimpseError::ChannelClosed);
        };
        stream.write_all(&wire).await?;
        stream.flush().await?;

        self.phase.await_response()?;
        let response = deadline(self.options.read_timeout, codec.read_response(stream)).await?;
        self.session.record_exchange()?;

        let mut played = false;
        if response.is_empty() {
            info!("{mode}: server had no result");
        } else {
            self.phase.begin_playback()?;
            match self.playback.play(&response.audio).await {
                Ok(()) => played = true,
                Err(e) => warn!("playback failed: {e}"),
            }
        }
        self.phase.complete()?;

        if self.options.strategy == Strategy::PerExchange {
            self.close().await?;
        }

        Ok(ExchangeReport {
            mode,
            sent: frame.payload.len(),
            received: response.audio.len(),
            played,
        })
    }

    /// Give up on an exchange that was interrupted before it finished.
    ///
    /// The connection is dropped without a termination frame and the
    /// session goes through Failed back to Idle, as on any other failure.
    pub fn abandon(&mut self) {
        if self.phase.is_idle() {
            return;
        }
        warn!("exchange abandoned in {}", self.phase);
        self.phase.fail();
        self.drop_connection();
        if let Err(e) = self.phase.recover() {
            warn!("{e}");
        }
    }

    /// Send any deferred termination and close. Safe to call when idle.
    pub async fn shutdown(&mut self) -> Result<(), GlimpseError> {
        if self.stream.is_some() {
            info!("closing {} session", self.strategy_name());
        }
        self.close().await
    }

    async fn open(&mut self) -> Result<(), GlimpseError> {
        self.session.begin_connect()?;
        let server = &self.options.server;
        match server.connect(self.options.connect_timeout).await {
            Ok(stream) => {
                info!("connected to {server}");
                self.stream = Some(stream);
                self.session.activate()
            }
            Err(e) => {
                self.session.force_close();
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> Result<(), GlimpseError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let exchanges = self.session.exchanges();
        self.session.begin_close()?;

        let result = async {
            stream.write_all(&TERMINATION).await?;
            stream.flush().await?;
            stream.shutdown().await
        }
        .await;
        if let Err(e) = result {
            debug!("termination not delivered: {e}");
        }

        self.session.finish_close()?;
        debug!("session closed after {exchanges} exchange(s)");
        Ok(())
    }

    fn drop_connection(&mut self) {
        if self.stream.take().is_some() {
            debug!("dropping connection to {}", self.options.server);
        }
        self.session.force_close();
    }

    fn strategy_name(&self) -> &'static str {
        match self.options.strategy {
            Strategy::PerExchange => "per-exchange",
            Strategy::Persistent => "persistent",
        }
    }
}
