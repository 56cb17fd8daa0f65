//! Spoken mode announcements.
//!
//! Each mode change is read out so the wearer knows which mode the
//! button left them in. The announcer runs on its own task, fed by the
//! [`ModeController`] watch channel; the trigger never waits on audio.

use std::process::Stdio;

use async_trait::async_trait;
use glimpse_core::{GlimpseError, Mode, ModeController};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Words spoken for `mode`.
pub fn phrase(mode: Mode) -> &'static str {
    match mode {
        Mode::Capture => "Capture mode",
        Mode::Describe => "Describe mode",
    }
}

#[async_trait]
pub trait Announcer: Send {
    async fn announce(&mut self, mode: Mode) -> Result<(), GlimpseError>;
}

/// Runs a text-to-speech command with the phrase appended,
/// e.g. `espeak` becomes `espeak "Describe mode"`.
#[derive(Debug, Clone)]
pub struct CommandAnnouncer {
    command: String,
}

impl CommandAnnouncer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Announcer for CommandAnnouncer {
    async fn announce(&mut self, mode: Mode) -> Result<(), GlimpseError> {
        let status = Command::new("sh")
            .arg("-c")
            .arg(format!("{} \"$0\"", self.command))
            .arg(phrase(mode))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| GlimpseError::PlaybackFailure(format!("`{}`: {e}", self.command)))?;

        if !status.success() {
            return Err(GlimpseError::PlaybackFailure(format!(
                "`{}`: {status}",
                self.command
            )));
        }
        Ok(())
    }
}

/// Announce every mode change until `shutdown` is cancelled.
///
/// Changes that arrive while an announcement is playing collapse into
/// the latest mode. Setting the mode it already has says nothing.
pub fn spawn_announcer<A>(
    mut announcer: A,
    controller: ModeController,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    A: Announcer + 'static,
{
    tokio::spawn(async move {
        let mut modes = controller.subscribe();
        let mut last = *modes.borrow_and_update();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = modes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            let mode = *modes.borrow_and_update();
            if mode == last {
                continue;
            }
            last = mode;
            debug!("announcing {mode}");
            if let Err(e) = announcer.announce(mode).await {
                warn!("announcement failed: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;

    #[derive(Clone, Default)]
    struct Spoken(Arc<Mutex<Vec<Mode>>>);

    #[async_trait]
    impl Announcer for Spoken {
        async fn announce(&mut self, mode: Mode) -> Result<(), GlimpseError> {
            self.0.lock().unwrap().push(mode);
            Ok(())
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn each_change_is_announced_once() {
        let controller = ModeController::new(Mode::Capture);
        let spoken = Spoken::default();
        let shutdown = CancellationToken::new();
        let task = spawn_announcer(spoken.clone(), controller.clone(), shutdown.clone());
        settle().await;

        controller.toggle();
        settle().await;
        controller.set(Mode::Describe);
        settle().await;
        controller.set(Mode::Capture);
        settle().await;

        assert_eq!(*spoken.0.lock().unwrap(), vec![Mode::Describe, Mode::Capture]);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn startup_mode_is_not_announced() {
        let controller = ModeController::new(Mode::Describe);
        let spoken = Spoken::default();
        let shutdown = CancellationToken::new();
        let task = spawn_announcer(spoken.clone(), controller, shutdown.clone());
        settle().await;

        shutdown.cancel();
        task.await.unwrap();
        assert!(spoken.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn command_announcer_reports_failure() {
        let mut ok = CommandAnnouncer::new("true");
        ok.announce(Mode::Capture).await.unwrap();

        let mut broken = CommandAnnouncer::new("false");
        let err = broken.announce(Mode::Describe).await.unwrap_err();
        assert!(matches!(err, GlimpseError::PlaybackFailure(_)));
    }
}
