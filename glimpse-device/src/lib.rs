//! # glimpse-device
//!
//! Device side of the glimpse protocol: a camera and a mode button on
//! one end of a TCP connection, a processing server on the other.
//!
//! - [`session`]: the capture → send → reply → playback cycle
//! - [`capture`] / [`playback`]: camera and speaker collaborators
//! - [`trigger`]: the mode button stand-in and the device event queue
//! - [`auto`]: repeating capture while a given mode is active
//! - [`announce`]: speaking the mode aloud when it changes
//! - [`device`]: the main loop consuming queued events
//! - [`config`]: TOML configuration

pub mod announce;
pub mod auto;
pub mod capture;
pub mod config;
pub mod device;
pub mod playback;
pub mod session;
pub mod trigger;

pub use announce::{Announcer, CommandAnnouncer};
pub use capture::{CaptureProvider, CommandCapture, FileCapture};
pub use config::DeviceConfig;
pub use device::{Device, RunStats};
pub use playback::{CommandPlayback, NullPlayback, PlaybackSink};
pub use session::{CaptureSession, ExchangeReport, SessionOptions, Strategy};
pub use trigger::{DeviceEvent, LineTrigger, ModeTrigger, TriggerAction};
