//! Image sources.
//!
//! A [`CaptureProvider`] hands the session one encoded image per call.
//! The session already knows the mode; providers may use it (a camera
//! that switches resolution per mode) or ignore it.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use glimpse_core::record::create_unique;
use glimpse_core::{CaptureRecord, GlimpseError, Mode};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait CaptureProvider: Send {
    /// Take one picture for `mode`; returns JPEG bytes.
    async fn acquire(&mut self, mode: Mode) -> Result<Bytes, GlimpseError>;
}

// ── CommandCapture ───────────────────────────────────────────────

/// Runs a shell command and takes its stdout as the image,
/// e.g. `libcamera-still -n -o -` or `fswebcam -q -`.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    command: String,
}

impl CommandCapture {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl CaptureProvider for CommandCapture {
    async fn acquire(&mut self, mode: Mode) -> Result<Bytes, GlimpseError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("GLIMPSE_MODE", mode.name())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GlimpseError::CaptureFailure(format!("`{}`: {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GlimpseError::CaptureFailure(format!(
                "`{}`: {} ({})",
                self.command,
                output.status,
                stderr.trim()
            )));
        }
        debug!("{mode}: captured {} bytes", output.stdout.len());
        Ok(Bytes::from(output.stdout))
    }
}

// ── FileCapture ──────────────────────────────────────────────────

/// Re-reads the same image file on every capture.
#[derive(Debug, Clone)]
pub struct FileCapture {
    path: PathBuf,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CaptureProvider for FileCapture {
    async fn acquire(&mut self, _mode: Mode) -> Result<Bytes, GlimpseError> {
        tokio::fs::read(&self.path)
            .await
            .map(Bytes::from)
            .map_err(|e| GlimpseError::CaptureFailure(format!("{}: {e}", self.path.display())))
    }
}

// ── Archive ──────────────────────────────────────────────────────

/// Keep a copy of a capture as `<dir>/<MODE>_<YYYYmmdd-HHMMSS-mmm>.jpg`,
/// never overwriting an earlier one.
pub async fn archive_capture(dir: &Path, record: &CaptureRecord) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let (stem, mut file) = create_unique(dir, &record.file_stem(), "jpg").await?;
    file.write_all(&record.image).await?;
    file.flush().await?;
    Ok(dir.join(format!("{stem}.jpg")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn command_stdout_is_the_image() {
        let mut cam = CommandCapture::new("printf 'jpeg:%s' \"$GLIMPSE_MODE\"");
        let img = cam.acquire(Mode::Describe).await.unwrap();
        assert_eq!(&img[..], b"jpeg:DESCRIBE");
    }

    #[tokio::test]
    async fn failing_command_is_capture_failure() {
        let mut cam = CommandCapture::new("echo 'no camera' >&2; exit 1");
        match cam.acquire(Mode::Capture).await {
            Err(GlimpseError::CaptureFailure(msg)) => assert!(msg.contains("no camera")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn file_capture_reads_each_time() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.jpg");
        std::fs::write(&path, b"first").unwrap();

        let mut cam = FileCapture::new(&path);
        assert_eq!(&cam.acquire(Mode::Capture).await.unwrap()[..], b"first");
        std::fs::write(&path, b"second").unwrap();
        assert_eq!(&cam.acquire(Mode::Capture).await.unwrap()[..], b"second");
    }

    #[tokio::test]
    async fn missing_file_is_capture_failure() {
        let mut cam = FileCapture::new("/nonexistent/glimpse.jpg");
        assert!(matches!(
            cam.acquire(Mode::Capture).await,
            Err(GlimpseError::CaptureFailure(_))
        ));
    }

    #[tokio::test]
    async fn archive_names_file_by_mode_and_time() {
        let tmp = tempfile::tempdir().unwrap();
        let record = CaptureRecord::new(Mode::Capture, &b"img"[..]);
        let path = archive_capture(tmp.path(), &record).await.unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("CAPTURE_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(std::fs::read(path).unwrap(), b"img");
    }

    #[tokio::test]
    async fn same_instant_captures_do_not_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let first = CaptureRecord::new(Mode::Describe, &b"one"[..]);
        let mut second = CaptureRecord::new(Mode::Describe, &b"two"[..]);
        second.timestamp = first.timestamp;

        let a = archive_capture(tmp.path(), &first).await.unwrap();
        let b = archive_capture(tmp.path(), &second).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(std::fs::read(a).unwrap(), b"one");
        assert_eq!(std::fs::read(b).unwrap(), b"two");
    }
}
