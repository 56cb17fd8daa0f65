//! Continuous capture.
//!
//! While the mode equals the configured auto-capture mode, a ticker task
//! queues a capture every interval. Leaving that mode cancels the ticker
//! at once, including a tick still waiting for room in the queue. Ticks
//! already queued carry the mode they were issued for, and the main loop
//! drops any that no longer match the current mode.

use std::time::Duration;

use glimpse_core::{Mode, ModeController};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::trigger::DeviceEvent;

/// Supervise auto-capture for `target` until `shutdown` is cancelled.
pub fn spawn_auto_capture(
    controller: ModeController,
    target: Mode,
    period: Duration,
    events: mpsc::Sender<DeviceEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut modes = controller.subscribe();
        let mut round: Option<(CancellationToken, JoinHandle<()>)> = None;

        loop {
            let active = *modes.borrow_and_update() == target;
            if active && round.is_none() {
                info!("auto-capture every {period:?} while in {target}");
                let token = shutdown.child_token();
                let ticker = tokio::spawn(tick(
                    controller.clone(),
                    target,
                    period,
                    events.clone(),
                    token.clone(),
                ));
                round = Some((token, ticker));
            } else if !active {
                if let Some((token, _)) = round.take() {
                    info!("auto-capture stopped");
                    token.cancel();
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = modes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if let Some((token, ticker)) = round.take() {
            token.cancel();
            let _ = ticker.await;
        }
    })
}

async fn tick(
    controller: ModeController,
    target: Mode,
    period: Duration,
    events: mpsc::Sender<DeviceEvent>,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = interval.tick() => {}
        }
        if token.is_cancelled() || controller.current() != target {
            return;
        }
        debug!("auto-capture tick");
        tokio::select! {
            _ = token.cancelled() => return,
            sent = events.send(DeviceEvent::AutoCapture(target)) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}
