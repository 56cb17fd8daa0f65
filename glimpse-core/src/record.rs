//! Values carried by one exchange.
//!
//! A [`CaptureRecord`] is consumed into a [`Frame`] when it is handed to
//! the codec; a [`ResponseRecord`] is what comes back. None of these
//! outlive the exchange that produced them.

use std::io;
use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Local};
use tokio::fs::{File, OpenOptions};

use crate::mode::Mode;

/// `strftime` pattern used for archived file names (millisecond resolution).
pub const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S-%3f";

// ── Frame ────────────────────────────────────────────────────────

/// One decoded request: the mode tag and exactly `length` payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub mode: Mode,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(mode: Mode, payload: impl Into<Bytes>) -> Self {
        Self {
            mode,
            payload: payload.into(),
        }
    }

    /// The value of the length prefix for this frame.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// What the server finds where the next mode tag is expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A complete request frame.
    Request(Frame),
    /// The untagged zero-length termination sentinel.
    Terminate,
    /// The peer closed the stream on a frame boundary.
    Closed,
}

// ── CaptureRecord ────────────────────────────────────────────────

/// A still image produced by one capture event.
#[derive(Debug, Clone)]
pub struct CaptureRecord {
    pub mode: Mode,
    pub timestamp: DateTime<Local>,
    pub image: Bytes,
}

impl CaptureRecord {
    /// Stamp `image` with the current local time.
    pub fn new(mode: Mode, image: impl Into<Bytes>) -> Self {
        Self {
            mode,
            timestamp: Local::now(),
            image: image.into(),
        }
    }

    /// `<MODE>_<YYYYmmdd-HHMMSS>`, the stem used when archiving.
    pub fn file_stem(&self) -> String {
        file_stem(self.mode, &self.timestamp)
    }

    /// Hand the image over to the codec.
    pub fn into_frame(self) -> Frame {
        Frame::new(self.mode, self.image)
    }
}

/// Archive stem for a `mode` at `timestamp`.
pub fn file_stem(mode: Mode, timestamp: &DateTime<Local>) -> String {
    format!("{}_{}", mode.name(), timestamp.format(STAMP_FORMAT))
}

/// Create `<dir>/<stem>.<ext>` without clobbering an existing file.
///
/// If the name is taken, `-1`, `-2`, ... is appended to the stem until
/// one is free. Returns the stem actually used and the new file.
pub async fn create_unique(dir: &Path, stem: &str, ext: &str) -> io::Result<(String, File)> {
    let mut candidate = stem.to_string();
    for n in 1u32.. {
        let path = dir.join(format!("{candidate}.{ext}"));
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                candidate = format!("{stem}-{n}");
            }
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(io::ErrorKind::AlreadyExists, stem.to_string()))
}

// ── ResponseRecord ───────────────────────────────────────────────

/// The synthesized audio returned for one request.
///
/// An empty record means the server produced no result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseRecord {
    pub audio: Bytes,
}

impl ResponseRecord {
    pub fn new(audio: impl Into<Bytes>) -> Self {
        Self {
            audio: audio.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn frame_length_matches_payload() {
        let f = Frame::new(Mode::Capture, &b"hello"[..]);
        assert_eq!(f.len(), 5);
        assert!(!f.is_empty());
        assert!(Frame::new(Mode::Describe, Bytes::new()).is_empty());
    }

    #[test]
    fn capture_record_becomes_frame() {
        let rec = CaptureRecord::new(Mode::Describe, vec![1u8, 2, 3]);
        let frame = rec.into_frame();
        assert_eq!(frame.mode, Mode::Describe);
        assert_eq!(&frame.payload[..], &[1, 2, 3]);
    }

    #[test]
    fn stem_format() {
        let ts = Local.with_ymd_and_hms(2025, 2, 9, 14, 5, 7).unwrap();
        assert_eq!(file_stem(Mode::Capture, &ts), "CAPTURE_20250209-140507-000");

        let later = ts + chrono::Duration::milliseconds(42);
        assert_eq!(file_stem(Mode::Capture, &later), "CAPTURE_20250209-140507-042");
    }

    #[tokio::test]
    async fn taken_stems_get_a_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let (first, _) = create_unique(tmp.path(), "CAPTURE_x", "jpg").await.unwrap();
        let (second, _) = create_unique(tmp.path(), "CAPTURE_x", "jpg").await.unwrap();
        let (third, _) = create_unique(tmp.path(), "CAPTURE_x", "jpg").await.unwrap();
        assert_eq!(first, "CAPTURE_x");
        assert_eq!(second, "CAPTURE_x-1");
        assert_eq!(third, "CAPTURE_x-2");
    }

    #[test]
    fn empty_response_means_no_result() {
        assert!(ResponseRecord::default().is_empty());
        assert!(!ResponseRecord::new(vec![0u8; 4]).is_empty());
    }
}
