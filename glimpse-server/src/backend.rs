//! Mode handlers.
//!
//! A [`HandlerRegistry`] routes each decoded request to the
//! [`InferenceBackend`] registered for its [`Mode`]. The built-in
//! [`CommandBackend`] shells out twice per request: once to turn the
//! image into text (OCR, captioning, a cloud call wrapped in a script…)
//! and once to turn that text into audio.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use glimpse_core::{GlimpseError, Mode};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

// ── Reply ────────────────────────────────────────────────────────

/// The result of handling one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// What the backend recognized or generated.
    pub text: String,
    /// Synthesized speech for `text`; empty means "no result".
    pub audio: Bytes,
}

impl Reply {
    pub fn new(text: impl Into<String>, audio: impl Into<Bytes>) -> Self {
        Self {
            text: text.into(),
            audio: audio.into(),
        }
    }
}

// ── InferenceBackend ─────────────────────────────────────────────

/// Turns an image into text and speech for one mode.
///
/// Implementations are shared by every connection, so any state they
/// hold must be read-only or internally synchronized.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn handle(&self, mode: Mode, image: Bytes) -> Result<Reply, GlimpseError>;
}

// ── HandlerRegistry ──────────────────────────────────────────────

/// Mode → backend routing table.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Mode, Arc<dyn InferenceBackend>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `backend` for `mode`, replacing any previous handler.
    pub fn register(&mut self, mode: Mode, backend: Arc<dyn InferenceBackend>) -> &mut Self {
        self.handlers.insert(mode, backend);
        self
    }

    pub fn with(mut self, mode: Mode, backend: Arc<dyn InferenceBackend>) -> Self {
        self.register(mode, backend);
        self
    }

    pub fn get(&self, mode: Mode) -> Option<&Arc<dyn InferenceBackend>> {
        self.handlers.get(&mode)
    }

    pub fn modes(&self) -> impl Iterator<Item = Mode> + '_ {
        self.handlers.keys().copied()
    }

    /// Run the handler for `mode`.
    ///
    /// A mode with no handler yields an empty reply, which reaches the
    /// device as a zero-length "no result" frame.
    pub async fn dispatch(&self, mode: Mode, image: Bytes) -> Result<Reply, GlimpseError> {
        match self.get(mode) {
            Some(backend) => backend.handle(mode, image).await,
            None => {
                warn!("no handler registered for {mode}; replying with no result");
                Ok(Reply::default())
            }
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("modes", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ── CommandBackend ───────────────────────────────────────────────

/// Backend built from two shell commands.
///
/// - `recognize`: image bytes on stdin, text on stdout
///   (e.g. `tesseract stdin stdout`).
/// - `speak`: text on stdin, audio bytes on stdout
///   (e.g. `espeak --stdout`).
///
/// When `recognize` prints nothing, `speak` is skipped and the reply is
/// empty.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    recognize: String,
    speak: String,
}

impl CommandBackend {
    pub fn new(recognize: impl Into<String>, speak: impl Into<String>) -> Self {
        Self {
            recognize: recognize.into(),
            speak: speak.into(),
        }
    }
}

#[async_trait]
impl InferenceBackend for CommandBackend {
    async fn handle(&self, mode: Mode, image: Bytes) -> Result<Reply, GlimpseError> {
        let raw = run_piped(&self.recognize, image).await?;
        let text = String::from_utf8_lossy(&raw).trim().to_string();
        debug!("{mode}: recognized {} chars", text.len());

        if text.is_empty() {
            return Ok(Reply::default());
        }

        let audio = run_piped(&self.speak, Bytes::from(text.clone().into_bytes())).await?;
        Ok(Reply::new(text, audio))
    }
}

/// Run `command` through `sh -c`, feed it `input`, collect stdout.
async fn run_piped(command: &str, input: Bytes) -> Result<Vec<u8>, GlimpseError> {
    let failure = |what: String| GlimpseError::HandlerFailure(format!("`{command}`: {what}"));

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| failure(format!("failed to start: {e}")))?;

    // Feed stdin from its own task so a chatty child can't deadlock us.
    let feeder = child.stdin.take().map(|mut stdin| {
        tokio::spawn(async move {
            // The child may exit without reading everything; that is its call.
            let _ = stdin.write_all(&input).await;
        })
    });

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| failure(format!("failed to run: {e}")))?;
    if let Some(feeder) = feeder {
        let _ = feeder.await;
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failure(format!("{} ({})", output.status, stderr.trim())));
    }
    Ok(output.stdout)
}
