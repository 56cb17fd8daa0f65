//! Audio output.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use glimpse_core::GlimpseError;
use tokio::process::Command;
use tracing::debug;

/// Plays the audio the server sent back.
///
/// Failures are reported but never end the exchange; the session logs
/// them and moves on.
#[async_trait]
pub trait PlaybackSink: Send {
    async fn play(&mut self, audio: &[u8]) -> Result<(), GlimpseError>;
}

// ── CommandPlayback ──────────────────────────────────────────────

/// Writes the clip to `<output_dir>/output.mp3` and runs a player on it.
///
/// The player command gets the file path appended, so `mpg321 -q`
/// becomes `mpg321 -q <output_dir>/output.mp3`.
#[derive(Debug, Clone)]
pub struct CommandPlayback {
    player: String,
    output_dir: PathBuf,
}

impl CommandPlayback {
    pub const FILE_NAME: &'static str = "output.mp3";

    pub fn new(player: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            player: player.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(Self::FILE_NAME)
    }
}

#[async_trait]
impl PlaybackSink for CommandPlayback {
    async fn play(&mut self, audio: &[u8]) -> Result<(), GlimpseError> {
        let failure = |what: String| GlimpseError::PlaybackFailure(what);

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| failure(format!("{}: {e}", self.output_dir.display())))?;
        let path = self.output_path();
        tokio::fs::write(&path, audio)
            .await
            .map_err(|e| failure(format!("{}: {e}", path.display())))?;

        let status = Command::new("sh")
            .arg("-c")
            .arg(format!("{} \"$0\"", self.player))
            .arg(&path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| failure(format!("`{}`: {e}", self.player)))?;

        if !status.success() {
            return Err(failure(format!("`{}`: {status}", self.player)));
        }
        debug!("played {} bytes", audio.len());
        Ok(())
    }
}

// ── NullPlayback ─────────────────────────────────────────────────

/// Discards audio; for headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPlayback;

#[async_trait]
impl PlaybackSink for NullPlayback {
    async fn play(&mut self, audio: &[u8]) -> Result<(), GlimpseError> {
        debug!("discarding {} bytes of audio", audio.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_clip_then_runs_player() {
        let tmp = tempfile::tempdir().unwrap();
        let played = tmp.path().join("played");
        // Copies the clip aside; the trailing `true` receives the appended path.
        let player = format!("cp -f \"$0\" {} && true", played.display());
        let mut sink = CommandPlayback::new(player, tmp.path().join("out"));

        sink.play(b"ID3 audio").await.unwrap();
        assert_eq!(std::fs::read(sink.output_path()).unwrap(), b"ID3 audio");
        assert_eq!(std::fs::read(played).unwrap(), b"ID3 audio");
    }

    #[tokio::test]
    async fn player_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = CommandPlayback::new("false", tmp.path());
        assert!(matches!(
            sink.play(b"x").await,
            Err(GlimpseError::PlaybackFailure(_))
        ));
        // The clip is still on disk for a manual replay.
        assert!(sink.output_path().exists());
    }

    #[tokio::test]
    async fn null_sink_accepts_anything() {
        NullPlayback.play(b"whatever").await.unwrap();
    }
}
