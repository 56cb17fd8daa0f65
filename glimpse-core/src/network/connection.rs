use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use crate::error::GlimpseError;

/// Where a processing server can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn to_socket_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Open a TCP connection, optionally bounded by `limit`.
    ///
    /// Any failure to establish the transport is a
    /// [`GlimpseError::ConnectFailure`] (or `Timeout`).
    pub async fn connect(&self, limit: Option<Duration>) -> Result<TcpStream, GlimpseError> {
        let addr = self.to_socket_string();
        let attempt = async {
            TcpStream::connect(&addr)
                .await
                .map_err(|source| GlimpseError::ConnectFailure {
                    addr: addr.clone(),
                    source,
                })
        };
        let stream = deadline(limit, attempt).await?;
        // Frames are written whole and flushed; don't let Nagle hold them.
        stream.set_nodelay(true)?;
        debug!("connected to {addr}");
        Ok(stream)
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Run `fut`, giving up after `limit` if one is set.
pub async fn deadline<F, T>(limit: Option<Duration>, fut: F) -> Result<T, GlimpseError>
where
    F: Future<Output = Result<T, GlimpseError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| GlimpseError::Timeout(limit))?,
        None => fut.await,
    }
}

/// `0` means "no limit", as in the config files.
pub fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
