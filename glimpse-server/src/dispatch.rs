//! Dispatch server.
//!
//! Accepts device connections and serves each one on its own task:
//! read a frame, run the handler for its mode, write the reply, repeat.
//! A failure closes only the connection it happened on; the accept loop
//! and every other connection carry on.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use glimpse_core::{FrameCodec, GlimpseError, Inbound, SessionPhase, deadline};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::archive::Archive;
use crate::backend::HandlerRegistry;

// ── DispatchOptions ──────────────────────────────────────────────

/// Per-connection protocol settings.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub codec: FrameCodec,
    /// Give up on a silent peer after this long. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Where to keep a copy of each processed exchange.
    pub archive: Option<Archive>,
}

struct Shared {
    registry: HandlerRegistry,
    options: DispatchOptions,
}

// ── DispatchServer ───────────────────────────────────────────────

pub struct DispatchServer {
    listener: TcpListener,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl DispatchServer {
    /// Bind the listener.
    pub async fn bind(
        addr: &str,
        registry: HandlerRegistry,
        options: DispatchOptions,
    ) -> Result<Self, GlimpseError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            shared: Arc::new(Shared { registry, options }),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GlimpseError> {
        Ok(self.listener.local_addr()?)
    }

    /// Token that stops the accept loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until the shutdown token fires.
    ///
    /// Connections already being served are left to finish on their own.
    pub async fn run(self) -> Result<(), GlimpseError> {
        let addr = self.local_addr()?;
        info!("dispatch server listening on {addr}");

        loop {
            let accept = tokio::select! {
                result = self.listener.accept() => result,
                _ = self.shutdown.cancelled() => break,
            };

            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };

            info!("device connected from {peer}");
            if let Err(e) = stream.set_nodelay(true) {
                debug!("{peer}: set_nodelay failed: {e}");
            }

            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                match serve_connection(stream, &shared.registry, &shared.options).await {
                    Ok(n) => info!("{peer}: closed after {n} exchange(s)"),
                    Err(e) if e.is_framing() => warn!("{peer}: bad frame, dropping: {e}"),
                    Err(e) => warn!("{peer}: connection dropped: {e}"),
                }
            });
        }

        info!("dispatch server stopped");
        Ok(())
    }
}

// ── Connection loop ──────────────────────────────────────────────

/// Serve one connection to completion; returns the number of exchanges.
///
/// Ends cleanly on end of stream at a frame boundary or on the
/// termination sentinel. Any error ends it without writing anything
/// further; the caller drops (and so closes) the stream.
pub async fn serve_connection<S>(
    mut stream: S,
    registry: &HandlerRegistry,
    options: &DispatchOptions,
) -> Result<u64, GlimpseError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut phase = SessionPhase::default();
    phase.begin_connect()?;
    phase.activate()?;

    match exchange_loop(&mut stream, registry, options, &mut phase).await {
        Ok(()) => {
            let exchanges = phase.exchanges();
            phase.begin_close()?;
            if let Err(e) = stream.shutdown().await {
                debug!("shutdown after {exchanges} exchange(s) failed: {e}");
            }
            phase.finish_close()?;
            Ok(exchanges)
        }
        Err(e) => {
            phase.force_close();
            Err(e)
        }
    }
}

async fn exchange_loop<S>(
    stream: &mut S,
    registry: &HandlerRegistry,
    options: &DispatchOptions,
    phase: &mut SessionPhase,
) -> Result<(), GlimpseError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let codec = &options.codec;

    loop {
        let frame = match deadline(options.read_timeout, codec.read_request(stream)).await? {
            Inbound::Request(frame) => frame,
            Inbound::Terminate => {
                debug!("termination sentinel received");
                return Ok(());
            }
            Inbound::Closed => return Ok(()),
        };

        let mode = frame.mode;
        info!("mode received: {mode} ({} bytes)", frame.len());

        let reply = registry
            .dispatch(mode, frame.payload.clone())
            .await
            .map_err(|e| {
                error!("{mode} handler failed: {e}");
                match e {
                    GlimpseError::HandlerFailure(_) => e,
                    other => GlimpseError::HandlerFailure(other.to_string()),
                }
            })?;

        if let Some(archive) = &options.archive {
            if let Err(e) = archive.store(mode, &frame.payload, &reply).await {
                warn!("archiving {mode} exchange failed: {e}");
            }
        }

        let response = codec.encode_response(&reply.audio)?;
        stream.write_all(&response).await?;
        stream.flush().await?;

        let n = phase.record_exchange()?;
        debug!("exchange {n} complete: {} audio bytes", reply.audio.len());
    }
}
