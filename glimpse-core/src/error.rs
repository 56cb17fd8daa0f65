//! Domain-specific error types for the glimpse protocol.
//!
//! All fallible operations return `Result<T, GlimpseError>`.
//! Every failure aborts at most one exchange (device) or one
//! connection (server); none of them is meant to take a process down.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the glimpse protocol.
#[derive(Debug, Error)]
pub enum GlimpseError {
    // ── Frame Errors ─────────────────────────────────────────────
    /// The 7-byte mode tag does not name a mode in the accepted tag set.
    #[error("malformed frame: unrecognized mode tag {tag:?}")]
    MalformedFrame { tag: String },

    /// The stream closed before a field was fully read.
    #[error("truncated frame: expected {expected} bytes, received {received}")]
    TruncatedFrame { expected: usize, received: usize },

    /// The declared or supplied payload exceeds the configured ceiling.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Collaborator Errors ──────────────────────────────────────
    /// The inference / TTS backend failed while processing a request.
    #[error("handler failure: {0}")]
    HandlerFailure(String),

    /// The capture provider could not produce an image.
    #[error("capture failure: {0}")]
    CaptureFailure(String),

    /// The playback sink could not play the received audio.
    #[error("playback failure: {0}")]
    PlaybackFailure(String),

    // ── Connection Errors ────────────────────────────────────────
    /// The transport connection could not be established.
    #[error("could not connect to {addr}: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A read or connect exceeded its configured deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The TCP/IO layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport went away between steps of one exchange.
    #[error("channel closed")]
    ChannelClosed,

    // ── State Errors ─────────────────────────────────────────────
    /// A state machine was asked for a transition it does not allow.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// A mode name from configuration or input matched no known mode.
    #[error("unknown mode: {0:?}")]
    UnknownMode(String),
}

impl GlimpseError {
    /// Whether this error came from the bytes on the wire rather than
    /// from the transport or a collaborator.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame { .. } | Self::TruncatedFrame { .. } | Self::PayloadTooLarge { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = GlimpseError::MalformedFrame {
            tag: "BOGUS".into(),
        };
        assert!(e.to_string().contains("BOGUS"));

        let e = GlimpseError::TruncatedFrame {
            expected: 10,
            received: 3,
        };
        assert!(e.to_string().contains("10"));
        assert!(e.to_string().contains('3'));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: GlimpseError = io_err.into();
        assert!(matches!(e, GlimpseError::Io(_)));
        assert!(!e.is_framing());
    }

    #[test]
    fn framing_classification() {
        assert!(GlimpseError::PayloadTooLarge { size: 2, max: 1 }.is_framing());
        assert!(!GlimpseError::HandlerFailure("x".into()).is_framing());
    }
}
