//! Configuration for the capture device.

use std::path::{Path, PathBuf};

use glimpse_core::{ConnectionInfo, FrameCodec, Mode, TagSet, millis};
use serde::{Deserialize, Serialize};

use crate::announce::CommandAnnouncer;
use crate::capture::{CaptureProvider, CommandCapture, FileCapture};
use crate::playback::{CommandPlayback, NullPlayback, PlaybackSink};
use crate::session::{SessionOptions, Strategy};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Server address and timeouts.
    pub network: NetworkConfig,
    /// Connection strategy and starting mode.
    pub session: SessionConfig,
    /// Wire protocol settings.
    pub protocol: ProtocolConfig,
    /// Image source.
    pub capture: CaptureConfig,
    /// Audio output.
    pub playback: PlaybackConfig,
    /// Continuous capture.
    pub auto_capture: AutoCaptureConfig,
    /// Button stand-in.
    pub trigger: TriggerConfig,
    /// Spoken mode changes.
    pub announce: AnnounceConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Processing server host.
    pub host: String,
    /// Processing server port.
    pub port: u16,
    /// Connect timeout in milliseconds (0 = OS default).
    pub connect_timeout_ms: u64,
    /// Reply timeout in milliseconds (0 = wait forever).
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// "per-exchange" or "persistent".
    pub strategy: Strategy,
    /// Mode at startup.
    pub initial_mode: Mode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Tag spelling to send: "canonical" or "legacy".
    pub tag_set: TagSet,
    /// Largest reply accepted, in bytes.
    pub max_payload: usize,
}

/// Image source. A non-empty `file` wins over `command`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Shell command printing one JPEG on stdout.
    pub command: String,
    /// Fixed image to send instead of running a camera.
    pub file: String,
    /// Keep a copy of every capture here. Empty disables.
    pub archive_dir: String,
}

/// Audio output. An empty `command` discards audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Player; the clip path is appended.
    pub command: String,
    /// Where `output.mp3` is written.
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCaptureConfig {
    /// Mode in which captures repeat on their own.
    pub mode: Mode,
    /// Seconds between captures (0 = disabled).
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// A toggle also takes a picture.
    pub capture_on_toggle: bool,
    /// Read trigger commands from stdin. Turn off for headless runs,
    /// where end of input would otherwise stop the device.
    pub stdin: bool,
}

/// Mode announcements. An empty `command` keeps the device silent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnounceConfig {
    /// Text-to-speech command; the phrase is appended, e.g. "espeak".
    pub command: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            connect_timeout_ms: 5000,
            read_timeout_ms: 0,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            tag_set: TagSet::Canonical,
            max_payload: glimpse_core::DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: "libcamera-still -n -t 1 -o -".into(),
            file: String::new(),
            archive_dir: String::new(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            command: "mpg321 -q".into(),
            output_dir: ".".into(),
        }
    }
}

impl Default for AutoCaptureConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Describe,
            interval_secs: 0,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            capture_on_toggle: true,
            stdin: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl DeviceConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn server(&self) -> ConnectionInfo {
        ConnectionInfo::new(self.network.host.clone(), self.network.port)
    }

    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.protocol.tag_set).with_max_payload(self.protocol.max_payload)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            server: self.server(),
            strategy: self.session.strategy,
            codec: self.codec(),
            connect_timeout: millis(self.network.connect_timeout_ms),
            read_timeout: millis(self.network.read_timeout_ms),
            archive_dir: (!self.capture.archive_dir.is_empty())
                .then(|| PathBuf::from(&self.capture.archive_dir)),
        }
    }

    pub fn capture_provider(&self) -> Box<dyn CaptureProvider> {
        if self.capture.file.is_empty() {
            Box::new(CommandCapture::new(self.capture.command.clone()))
        } else {
            Box::new(FileCapture::new(&self.capture.file))
        }
    }

    pub fn playback_sink(&self) -> Box<dyn PlaybackSink> {
        if self.playback.command.is_empty() {
            Box::new(NullPlayback)
        } else {
            Box::new(CommandPlayback::new(
                self.playback.command.clone(),
                &self.playback.output_dir,
            ))
        }
    }

    pub fn announcer(&self) -> Option<CommandAnnouncer> {
        (!self.announce.command.is_empty()).then(|| CommandAnnouncer::new(&self.announce.command))
    }

    /// Auto-capture mode and period, when enabled.
    pub fn auto_capture(&self) -> Option<(Mode, std::time::Duration)> {
        (self.auto_capture.interval_secs > 0).then(|| {
            (
                self.auto_capture.mode,
                std::time::Duration::from_secs(self.auto_capture.interval_secs),
            )
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
