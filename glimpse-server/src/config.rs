//! Configuration for the processing server.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use glimpse_core::{FrameCodec, GlimpseError, Mode, TagSet, millis};
use serde::{Deserialize, Serialize};

use crate::archive::Archive;
use crate::backend::{CommandBackend, HandlerRegistry};
use crate::dispatch::DispatchOptions;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener settings.
    pub network: NetworkConfig,
    /// Wire protocol settings.
    pub protocol: ProtocolConfig,
    /// Per-mode handler commands, keyed by mode name (either spelling).
    pub handlers: BTreeMap<String, HandlerConfig>,
    /// Exchange archive.
    pub archive: ArchiveConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind.
    pub bind: String,
    /// TCP port devices connect to.
    pub port: u16,
}

/// Wire protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Tag spelling written on the wire: "canonical" or "legacy".
    pub tag_set: TagSet,
    /// Also accept tags from the other spelling.
    pub accept_legacy: bool,
    /// Largest accepted payload, in bytes.
    pub max_payload: usize,
    /// Per-frame read timeout in milliseconds (0 = wait forever).
    pub read_timeout_ms: u64,
}

/// Commands that implement one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Image on stdin → text on stdout.
    pub recognize: String,
    /// Text on stdin → audio on stdout.
    pub speak: String,
}

/// Archive settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Directory for image/text/audio copies. Empty disables archiving.
    pub dir: String,
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
            bind: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            tag_set: TagSet::Canonical,
            accept_legacy: false,
            max_payload: glimpse_core::DEFAULT_MAX_PAYLOAD,
            read_timeout_ms: 0,
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

/// Handlers used when the config names none: tesseract reads text for
/// CAPTURE, espeak speaks it. DESCRIBE needs a captioning model, so it
/// stays unregistered and answers "no result" until one is configured.
pub fn default_handlers() -> BTreeMap<String, HandlerConfig> {
    BTreeMap::from([(
        Mode::Capture.name().to_string(),
        HandlerConfig {
            recognize: "tesseract stdin stdout 2>/dev/null".into(),
            speak: "espeak --stdout".into(),
        },
    )])
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
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

    /// Default config with the default handlers filled in, for `--gen-config`.
    pub fn example() -> Self {
        Self {
            handlers: default_handlers(),
            ..Self::default()
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }

    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new(self.protocol.tag_set)
            .with_legacy(self.protocol.accept_legacy)
            .with_max_payload(self.protocol.max_payload)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            codec: self.codec(),
            read_timeout: millis(self.protocol.read_timeout_ms),
            archive: (!self.archive.dir.is_empty()).then(|| Archive::new(&self.archive.dir)),
        }
    }

    /// One [`CommandBackend`] per configured mode; defaults when none are.
    pub fn registry(&self) -> Result<HandlerRegistry, GlimpseError> {
        let handlers = if self.handlers.is_empty() {
            default_handlers()
        } else {
            self.handlers.clone()
        };

        let mut registry = HandlerRegistry::new();
        for (name, h) in handlers {
            let mode: Mode = name.parse()?;
            registry.register(mode, Arc::new(CommandBackend::new(h.recognize, h.speak)));
        }
        Ok(registry)
    }
}

// ── Tests ────────────────────────────────────────────────────────
