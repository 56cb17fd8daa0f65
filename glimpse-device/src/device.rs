//! Device main loop.
//!
//! Triggers and the auto-capture ticker only queue [`DeviceEvent`]s. This
//! loop is the single consumer: it dequeues an event, runs the exchange
//! to completion, then takes the next one. Shutdown interrupts an
//! exchange in flight; a stalled server never holds the device open.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::CaptureSession;
use crate::trigger::DeviceEvent;

/// Counters for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub completed: u64,
    /// Includes an exchange cut short by shutdown.
    pub failed: u64,
    /// Auto-capture ticks dropped because the mode had changed.
    pub stale: u64,
}

pub struct Device {
    session: CaptureSession,
    events: mpsc::Receiver<DeviceEvent>,
    shutdown: CancellationToken,
}

impl Device {
    pub fn new(
        session: CaptureSession,
        events: mpsc::Receiver<DeviceEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session,
            events,
            shutdown,
        }
    }

    /// Process events until shutdown is requested or every producer is gone.
    ///
    /// On the way out the session is closed (writing the deferred
    /// termination frame in persistent mode) and the shutdown token is
    /// cancelled so background tasks stop too.
    pub async fn run(mut self) -> RunStats {
        let mut stats = RunStats::default();

        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = self.events.recv() => event,
            };

            match event {
                Some(DeviceEvent::Capture) => {}
                Some(DeviceEvent::AutoCapture(mode)) => {
                    let current = self.session.controller().current();
                    if current != mode {
                        debug!("dropping {mode} auto-capture queued before switch to {current}");
                        stats.stale += 1;
                        continue;
                    }
                }
                Some(DeviceEvent::Shutdown) | None => break,
            }

            let outcome = tokio::select! {
                result = self.session.exchange() => Some(result),
                _ = self.shutdown.cancelled() => None,
            };
            match outcome {
                Some(Ok(report)) => {
                    stats.completed += 1;
                    info!(
                        "{} exchange done: sent {} bytes, got {} bytes",
                        report.mode, report.sent, report.received
                    );
                }
                Some(Err(_)) => stats.failed += 1,
                None => {
                    self.session.abandon();
                    stats.failed += 1;
                    break;
                }
            }
        }

        if let Err(e) = self.session.shutdown().await {
            warn!("closing session failed: {e}");
        }
        self.shutdown.cancel();
        info!(
            "device stopped: {} exchange(s) completed, {} failed, {} stale tick(s) dropped",
            stats.completed, stats.failed, stats.stale
        );
        stats
    }
}
