//! Mode-change triggers.
//!
//! A trigger stands in for the physical button. It runs on its own task
//! and only ever touches the [`ModeController`] and the device event
//! queue; the capture itself happens on the main loop, never here.

use async_trait::async_trait;
use glimpse_core::{Mode, ModeController};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Work queued for the device main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Run one exchange with whatever mode is current when it starts.
    Capture,
    /// Auto-capture tick issued while `Mode` was current. Dropped if the
    /// mode has moved on by the time it is dequeued.
    AutoCapture(Mode),
    /// Stop the main loop.
    Shutdown,
}

/// What one trigger firing asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// Flip to the other mode (the button).
    Toggle,
    /// Switch to a specific mode.
    Set(Mode),
    /// Take a picture now.
    Capture,
    /// Stop the device.
    Quit,
}

impl TriggerAction {
    /// Parse one command line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Result<Self, String>> {
        let word = line.trim();
        if word.is_empty() {
            return None;
        }
        let action = match word.to_ascii_lowercase().as_str() {
            "toggle" | "t" => TriggerAction::Toggle,
            "capture" | "c" | "shoot" => TriggerAction::Capture,
            "quit" | "q" | "exit" => TriggerAction::Quit,
            _ => match word.parse::<Mode>() {
                Ok(mode) => TriggerAction::Set(mode),
                Err(_) => return Some(Err(word.to_string())),
            },
        };
        Some(Ok(action))
    }
}

/// Source of trigger firings.
#[async_trait]
pub trait ModeTrigger: Send {
    /// Wait for the next firing; `None` once the source is exhausted.
    async fn next_action(&mut self) -> Option<TriggerAction>;
}

// ── LineTrigger ──────────────────────────────────────────────────

/// Reads newline-delimited commands (`toggle`, `capture`, `DESCRIBE`,
/// `MODE-I`, `quit`, …) from any async reader.
pub struct LineTrigger<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> LineTrigger<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> ModeTrigger for LineTrigger<R> {
    async fn next_action(&mut self) -> Option<TriggerAction> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(e) => {
                    warn!("trigger input failed: {e}");
                    return None;
                }
            };
            match TriggerAction::parse(&line) {
                Some(Ok(action)) => return Some(action),
                Some(Err(word)) => warn!("unknown trigger command {word:?}"),
                None => {}
            }
        }
    }
}

// ── Driver ───────────────────────────────────────────────────────

/// Run `trigger` on its own task until it is exhausted or asks to quit.
///
/// With `capture_on_toggle`, a toggle also queues a capture, so one press
/// both switches mode and shoots. Exhaustion queues [`DeviceEvent::Shutdown`].
pub fn spawn_trigger<T>(
    mut trigger: T,
    controller: ModeController,
    events: mpsc::Sender<DeviceEvent>,
    capture_on_toggle: bool,
) -> JoinHandle<()>
where
    T: ModeTrigger + 'static,
{
    tokio::spawn(async move {
        while let Some(action) = trigger.next_action().await {
            debug!("trigger fired: {action:?}");
            let event = match action {
                TriggerAction::Toggle => {
                    controller.toggle();
                    capture_on_toggle.then_some(DeviceEvent::Capture)
                }
                TriggerAction::Set(mode) => {
                    controller.set(mode);
                    None
                }
                TriggerAction::Capture => Some(DeviceEvent::Capture),
                TriggerAction::Quit => break,
            };
            if let Some(event) = event {
                if events.send(event).await.is_err() {
                    return;
                }
            }
        }
        info!("trigger finished");
        let _ = events.send(DeviceEvent::Shutdown).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_mode_names() {
        assert_eq!(TriggerAction::parse("toggle"), Some(Ok(TriggerAction::Toggle)));
        assert_eq!(TriggerAction::parse(" Capture \n"), Some(Ok(TriggerAction::Capture)));
        assert_eq!(
            TriggerAction::parse("DESCRIBE"),
            Some(Ok(TriggerAction::Set(Mode::Describe)))
        );
        assert_eq!(
            TriggerAction::parse("MODE-I"),
            Some(Ok(TriggerAction::Set(Mode::Capture)))
        );
        assert_eq!(TriggerAction::parse("   "), None);
        assert_eq!(TriggerAction::parse("zoom"), Some(Err("zoom".into())));
    }

    #[tokio::test]
    async fn line_trigger_skips_junk() {
        let input: &[u8] = b"toggle\n\nzoom\nDESCRIBE\n";
        let mut trigger = LineTrigger::new(input);
        assert_eq!(trigger.next_action().await, Some(TriggerAction::Toggle));
        assert_eq!(trigger.next_action().await, Some(TriggerAction::Set(Mode::Describe)));
        assert_eq!(trigger.next_action().await, None);
    }

    #[tokio::test]
    async fn toggle_flips_mode_and_optionally_captures() {
        let controller = ModeController::new(Mode::Capture);
        let (tx, mut rx) = mpsc::channel(8);
        let input: &[u8] = b"toggle\ntoggle\n";

        spawn_trigger(LineTrigger::new(input), controller.clone(), tx, true)
            .await
            .unwrap();

        assert_eq!(controller.current(), Mode::Capture);
        assert_eq!(rx.recv().await, Some(DeviceEvent::Capture));
        assert_eq!(rx.recv().await, Some(DeviceEvent::Capture));
        assert_eq!(rx.recv().await, Some(DeviceEvent::Shutdown));
    }

    #[tokio::test]
    async fn mode_change_alone_queues_nothing() {
        let controller = ModeController::new(Mode::Capture);
        let (tx, mut rx) = mpsc::channel(8);
        let input: &[u8] = b"DESCRIBE\ntoggle\nquit\ncapture\n";

        spawn_trigger(LineTrigger::new(input), controller.clone(), tx, false)
            .await
            .unwrap();

        // The toggle after DESCRIBE lands back on CAPTURE; `quit` stops
        // before the trailing capture is read.
        assert_eq!(controller.current(), Mode::Capture);
        assert_eq!(rx.recv().await, Some(DeviceEvent::Shutdown));
        assert_eq!(rx.recv().await, None);
    }
}
