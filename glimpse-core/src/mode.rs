//! Operating modes and their wire spellings.
//!
//! Routing is always by [`Mode`] identity. The spelling on the wire is a
//! property of the [`TagSet`] a codec was built with, never of the mode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GlimpseError;

/// Width of the mode tag on the wire, in bytes.
pub const MODE_TAG_LEN: usize = 7;

// ── Mode ─────────────────────────────────────────────────────────

/// The operating state attached to a capture; selects server-side handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    /// Read the text in front of the camera (OCR).
    #[default]
    Capture,
    /// Describe the scene in front of the camera.
    Describe,
}

impl Mode {
    /// Every mode, in toggle order.
    pub const ALL: [Mode; 2] = [Mode::Capture, Mode::Describe];

    /// Canonical name of the mode.
    pub fn name(self) -> &'static str {
        match self {
            Mode::Capture => "CAPTURE",
            Mode::Describe => "DESCRIBE",
        }
    }

    /// Name used by legacy peers (`MODE-I` / `MODE-II`).
    pub fn legacy_name(self) -> &'static str {
        match self {
            Mode::Capture => "MODE-I",
            Mode::Describe => "MODE-II",
        }
    }

    /// The mode a button press switches to.
    pub fn toggled(self) -> Mode {
        match self {
            Mode::Capture => Mode::Describe,
            Mode::Describe => Mode::Capture,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = GlimpseError;

    /// Parses either spelling (canonical or legacy), case-sensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Mode::ALL
            .into_iter()
            .find(|m| m.name() == s || m.legacy_name() == s)
            .ok_or_else(|| GlimpseError::UnknownMode(s.to_string()))
    }
}

// ── TagSet ───────────────────────────────────────────────────────

/// A family of wire spellings for the modes.
///
/// | Mode       | `Canonical`          | `Legacy`    |
/// |------------|----------------------|-------------|
/// | `Capture`  | `CAPTURE`            | `MODE-I␠`   |
/// | `Describe` | `DESCRIB` (truncated)| `MODE-II`   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSet {
    #[default]
    Canonical,
    Legacy,
}

impl TagSet {
    /// The full (possibly longer than 7 bytes) name of `mode` in this set.
    pub fn name_of(self, mode: Mode) -> &'static str {
        match self {
            TagSet::Canonical => mode.name(),
            TagSet::Legacy => mode.legacy_name(),
        }
    }

    /// The other tag set.
    pub fn other(self) -> TagSet {
        match self {
            TagSet::Canonical => TagSet::Legacy,
            TagSet::Legacy => TagSet::Canonical,
        }
    }

    /// Map an already-trimmed wire tag back to its mode.
    ///
    /// Names longer than [`MODE_TAG_LEN`] are compared in their truncated
    /// wire form, so `DESCRIB` resolves to [`Mode::Describe`].
    pub fn lookup(self, trimmed: &str) -> Option<Mode> {
        Mode::ALL
            .into_iter()
            .find(|&m| wire_name(self.name_of(m)) == trimmed)
    }
}

/// The part of `name` that survives truncation to the tag width.
fn wire_name(name: &str) -> &str {
    &name[..name.len().min(MODE_TAG_LEN)]
}
