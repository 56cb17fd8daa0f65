//! Device-side exchange state machine.
//!
//! ```text
//!  Idle ──► Capturing ──► Sending ──► AwaitingResponse ──► Playing ──► Idle
//!                                            │                          ▲
//!                                            └──── (no result) ─────────┘
//!
//!  any ──► Failed ──► Idle
//! ```

use crate::error::GlimpseError;

/// Where one capture → send → response → playback cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangePhase {
    #[default]
    Idle,
    Capturing,
    Sending,
    AwaitingResponse,
    Playing,
    Failed,
}

impl std::fmt::Display for ExchangePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ExchangePhase {
    fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Capturing => "Capturing",
            Self::Sending => "Sending",
            Self::AwaitingResponse => "AwaitingResponse",
            Self::Playing => "Playing",
            Self::Failed => "Failed",
        }
    }

    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }

    fn step(&mut self, allowed: &[ExchangePhase], to: ExchangePhase) -> Result<(), GlimpseError> {
        if allowed.contains(self) {
            *self = to;
            Ok(())
        } else {
            Err(GlimpseError::InvalidTransition {
                from: self.name(),
                to: to.name(),
            })
        }
    }

    pub fn begin_capture(&mut self) -> Result<(), GlimpseError> {
        self.step(&[Self::Idle], Self::Capturing)
    }

    pub fn begin_send(&mut self) -> Result<(), GlimpseError> {
        self.step(&[Self::Capturing], Self::Sending)
    }

    pub fn await_response(&mut self) -> Result<(), GlimpseError> {
        self.step(&[Self::Sending], Self::AwaitingResponse)
    }

    pub fn begin_playback(&mut self) -> Result<(), GlimpseError> {
        self.step(&[Self::AwaitingResponse], Self::Playing)
    }

    /// Back to `Idle` after playback, or straight from
    /// `AwaitingResponse` when the server produced no result.
    pub fn complete(&mut self) -> Result<(), GlimpseError> {
        self.step(&[Self::Playing, Self::AwaitingResponse], Self::Idle)
    }

    /// Abort from any state.
    pub fn fail(&mut self) {
        *self = Self::Failed;
    }

    pub fn recover(&mut self) -> Result<(), GlimpseError> {
        self.step(&[Self::Failed], Self::Idle)
    }
}
