//! # glimpse-core
//!
//! Core protocol library shared by the glimpse capture device and the
//! processing server.
//!
//! This crate contains:
//! - **Modes**: `Mode`, the `TagSet` spellings, and the `ModeController`
//!   that holds the process-wide current mode
//! - **Codec**: `FrameCodec` for the tag + length + payload wire format
//! - **Records**: `Frame`, `CaptureRecord`, `ResponseRecord`
//! - **State**: `SessionPhase` and `ExchangePhase` state machines
//! - **Network**: `ConnectionInfo` and read/connect deadlines
//! - **Error**: `GlimpseError`, a typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod controller;
pub mod error;
pub mod mode;
pub mod network;
pub mod record;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{DEFAULT_MAX_PAYLOAD, FrameCodec, LENGTH_PREFIX_LEN, TERMINATION};
pub use controller::ModeController;
pub use error::GlimpseError;
pub use mode::{MODE_TAG_LEN, Mode, TagSet};
pub use network::{ConnectionInfo, deadline, millis};
pub use record::{CaptureRecord, Frame, Inbound, ResponseRecord};
pub use state::{ExchangePhase, SessionPhase};
