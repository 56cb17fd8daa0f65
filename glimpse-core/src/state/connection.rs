//! Transport session state machine shared by device and server.
//!
//! Provides a `SessionPhase` enum that models the lifecycle of one
//! transport connection, with validated transitions that return
//! `Result` instead of panicking.

use std::time::Instant;

use crate::error::GlimpseError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of a transport session.
///
/// ```text
///  Closed ──► Connecting ──► Active ──► Closing ──► Closed
///                  │                       ▲
///                  └───────────────────────┘
/// ```
///
/// A session may carry one exchange (per-exchange strategy) or many
/// sequential exchanges (persistent strategy); the phases are the same.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No transport. Initial / terminal state.
    #[default]
    Closed,

    /// Connection initiated but not yet established.
    Connecting,

    /// Frames may flow.
    Active {
        /// When the session became active.
        since: Instant,
        /// Exchanges completed on this session so far.
        exchanges: u64,
    },

    /// Termination sent or peer gone; transport being torn down.
    Closing,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl SessionPhase {
    fn name(&self) -> &'static str {
        match self {
            Self::Closed => "Closed",
            Self::Connecting => "Connecting",
            Self::Active { .. } => "Active",
            Self::Closing => "Closing",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Completed exchanges, or 0 when not active.
    pub fn exchanges(&self) -> u64 {
        match self {
            Self::Active { exchanges, .. } => *exchanges,
            _ => 0,
        }
    }

    /// How long the session has been active.
    pub fn active_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Active { since, .. } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    fn invalid(&self, to: &'static str) -> GlimpseError {
        GlimpseError::InvalidTransition {
            from: self.name(),
            to,
        }
    }

    /// Valid from: `Closed`.
    pub fn begin_connect(&mut self) -> Result<(), GlimpseError> {
        match self {
            Self::Closed => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(self.invalid("Connecting")),
        }
    }

    /// Valid from: `Connecting`.
    pub fn activate(&mut self) -> Result<(), GlimpseError> {
        match self {
            Self::Connecting => {
                *self = Self::Active {
                    since: Instant::now(),
                    exchanges: 0,
                };
                Ok(())
            }
            _ => Err(self.invalid("Active")),
        }
    }

    /// Count one completed exchange. Valid in: `Active`.
    pub fn record_exchange(&mut self) -> Result<u64, GlimpseError> {
        match self {
            Self::Active { exchanges, .. } => {
                *exchanges += 1;
                Ok(*exchanges)
            }
            _ => Err(self.invalid("Active")),
        }
    }

    /// Valid from: `Connecting` (connect failure), `Active`.
    pub fn begin_close(&mut self) -> Result<(), GlimpseError> {
        match self {
            Self::Connecting | Self::Active { .. } => {
                *self = Self::Closing;
                Ok(())
            }
            _ => Err(self.invalid("Closing")),
        }
    }

    /// Valid from: `Closing`.
    pub fn finish_close(&mut self) -> Result<(), GlimpseError> {
        match self {
            Self::Closing => {
                *self = Self::Closed;
                Ok(())
            }
            _ => Err(self.invalid("Closed")),
        }
    }

    /// Force-reset to `Closed` regardless of current state.
    ///
    /// Use this when the transport failed mid-stream.
    pub fn force_close(&mut self) {
        *self = Self::Closed;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = SessionPhase::default();
        assert!(phase.is_closed());

        phase.begin_connect().unwrap();
        assert_eq!(phase, SessionPhase::Connecting);

        phase.activate().unwrap();
        assert!(phase.is_active());
        assert!(phase.active_duration().is_some());

        assert_eq!(phase.record_exchange().unwrap(), 1);
        assert_eq!(phase.record_exchange().unwrap(), 2);
        assert_eq!(phase.exchanges(), 2);

        phase.begin_close().unwrap();
        assert_eq!(phase, SessionPhase::Closing);

        phase.finish_close().unwrap();
        assert!(phase.is_closed());
    }

    #[test]
    fn cannot_activate_from_closed() {
        let mut phase = SessionPhase::Closed;
        assert!(matches!(
            phase.activate(),
            Err(GlimpseError::InvalidTransition {
                from: "Closed",
                to: "Active"
            })
        ));
    }

    #[test]
    fn cannot_connect_twice() {
        let mut phase = SessionPhase::Closed;
        phase.begin_connect().unwrap();
        assert!(phase.begin_connect().is_err());
    }

    #[test]
    fn exchanges_only_counted_when_active() {
        let mut phase = SessionPhase::Closing;
        assert!(phase.record_exchange().is_err());
        assert_eq!(phase.exchanges(), 0);
    }

    #[test]
    fn connect_failure_closes() {
        let mut phase = SessionPhase::Closed;
        phase.begin_connect().unwrap();
        phase.begin_close().unwrap();
        phase.finish_close().unwrap();
        assert!(phase.is_closed());
    }

    #[test]
    fn force_close_from_any_state() {
        let mut phase = SessionPhase::Closed;
        phase.begin_connect().unwrap();
        phase.activate().unwrap();
        phase.force_close();
        assert!(phase.is_closed());
    }

    #[test]
    fn display_format() {
        assert_eq!(SessionPhase::Closed.to_string(), "Closed");
        assert_eq!(SessionPhase::Connecting.to_string(), "Connecting");
        assert_eq!(SessionPhase::Closing.to_string(), "Closing");
    }
}
