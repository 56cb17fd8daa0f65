//! Frame codec.
//!
//! ```text
//! Frame         := ModeTag(7, ASCII, space-padded/truncated) Length(u32 LE) Payload
//! ResponseFrame := Length(u32 LE) Payload
//! Termination   := Length(u32 LE) == 0
//! ```
//!
//! Encoding is pure. Decoding reads from any [`AsyncRead`] and always
//! loops until a field is complete, because the transport may deliver
//! it in arbitrarily small pieces. A stream that ends mid-field is a
//! [`GlimpseError::TruncatedFrame`], never a short result.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::GlimpseError;
use crate::mode::{MODE_TAG_LEN, Mode, TagSet};
use crate::record::{Frame, Inbound, ResponseRecord};

/// Width of the length prefix, in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default ceiling on a single payload (64 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

/// The wire form of the termination sentinel.
pub const TERMINATION: [u8; LENGTH_PREFIX_LEN] = [0; LENGTH_PREFIX_LEN];

const READ_CHUNK: usize = 8 * 1024;

/// Encoder/decoder for one peer's view of the protocol.
///
/// `tags` picks the spelling written on the wire. The decoder accepts
/// that set and, when `accept_legacy` is on, the other set too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    tags: TagSet,
    accept_legacy: bool,
    max_payload: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(TagSet::Canonical)
    }
}

impl FrameCodec {
    pub fn new(tags: TagSet) -> Self {
        Self {
            tags,
            accept_legacy: false,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Also decode tags from the other tag set.
    pub fn with_legacy(mut self, accept: bool) -> Self {
        self.accept_legacy = accept;
        self
    }

    /// Cap payloads at `max` bytes (clamped to what a `u32` can describe).
    pub fn with_max_payload(mut self, max: usize) -> Self {
        self.max_payload = max.min(u32::MAX as usize);
        self
    }

    pub fn tag_set(&self) -> TagSet {
        self.tags
    }

    // ── Encoding ─────────────────────────────────────────────────

    /// The fixed-width tag for `mode`: space-padded if short, truncated
    /// if long.
    pub fn encode_tag(&self, mode: Mode) -> [u8; MODE_TAG_LEN] {
        let name = self.tags.name_of(mode).as_bytes();
        let mut tag = [b' '; MODE_TAG_LEN];
        let n = name.len().min(MODE_TAG_LEN);
        tag[..n].copy_from_slice(&name[..n]);
        tag
    }

    /// Mode tag, length prefix and payload, verbatim.
    pub fn encode(&self, mode: Mode, payload: &[u8]) -> Result<Bytes, GlimpseError> {
        let length = self.check_len(payload.len())?;
        let mut buf = BytesMut::with_capacity(MODE_TAG_LEN + LENGTH_PREFIX_LEN + payload.len());
        buf.put_slice(&self.encode_tag(mode));
        buf.put_u32_le(length);
        buf.put_slice(payload);
        Ok(buf.freeze())
    }

    /// Length-prefixed reply; replies carry no mode tag.
    pub fn encode_response(&self, payload: &[u8]) -> Result<Bytes, GlimpseError> {
        let length = self.check_len(payload.len())?;
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
        buf.put_u32_le(length);
        buf.put_slice(payload);
        Ok(buf.freeze())
    }

    /// A zero length prefix with no tag and no body.
    pub fn encode_termination() -> Bytes {
        Bytes::from_static(&TERMINATION)
    }

    pub fn is_termination(length: u32) -> bool {
        length == 0
    }

    fn check_len(&self, len: usize) -> Result<u32, GlimpseError> {
        if len > self.max_payload {
            return Err(GlimpseError::PayloadTooLarge {
                size: len,
                max: self.max_payload,
            });
        }
        u32::try_from(len).map_err(|_| GlimpseError::PayloadTooLarge {
            size: len,
            max: u32::MAX as usize,
        })
    }

    // ── Decoding ─────────────────────────────────────────────────

    /// Map a raw 7-byte tag to its mode after stripping trailing padding.
    pub fn parse_tag(&self, raw: &[u8; MODE_TAG_LEN]) -> Result<Mode, GlimpseError> {
        let malformed = || GlimpseError::MalformedFrame {
            tag: String::from_utf8_lossy(raw).into_owned(),
        };
        let text = std::str::from_utf8(raw).map_err(|_| malformed())?;
        let trimmed = text.trim_end_matches([' ', '\0']);

        self.tags
            .lookup(trimmed)
            .or_else(|| {
                self.accept_legacy
                    .then(|| self.tags.other().lookup(trimmed))
                    .flatten()
            })
            .ok_or_else(malformed)
    }

    /// Read exactly one mode tag.
    pub async fn decode_mode<R>(&self, reader: &mut R) -> Result<Mode, GlimpseError>
    where
        R: AsyncRead + Unpin,
    {
        let mut raw = [0u8; MODE_TAG_LEN];
        read_exact_or_truncated(reader, &mut raw).await?;
        self.parse_tag(&raw)
    }

    /// Read exactly one little-endian length prefix.
    pub async fn decode_length<R>(&self, reader: &mut R) -> Result<u32, GlimpseError>
    where
        R: AsyncRead + Unpin,
    {
        let mut raw = [0u8; LENGTH_PREFIX_LEN];
        read_exact_or_truncated(reader, &mut raw).await?;
        Ok(u32::from_le_bytes(raw))
    }

    /// Accumulate exactly `length` payload bytes.
    pub async fn decode_payload<R>(
        &self,
        reader: &mut R,
        length: u32,
    ) -> Result<Bytes, GlimpseError>
    where
        R: AsyncRead + Unpin,
    {
        let expected = length as usize;
        if expected > self.max_payload {
            return Err(GlimpseError::PayloadTooLarge {
                size: expected,
                max: self.max_payload,
            });
        }

        let mut buf = BytesMut::with_capacity(expected.min(READ_CHUNK));
        while buf.len() < expected {
            let want = (expected - buf.len()).min(READ_CHUNK);
            buf.reserve(want);
            let n = (&mut *reader).take(want as u64).read_buf(&mut buf).await?;
            if n == 0 {
                return Err(GlimpseError::TruncatedFrame {
                    expected,
                    received: buf.len(),
                });
            }
        }
        Ok(buf.freeze())
    }

    /// Read whatever comes next on a request stream.
    ///
    /// End of stream before the first tag byte is a clean close. A leading
    /// NUL byte cannot start a mode tag, so it marks the untagged
    /// termination sentinel. A tagged frame with length 0 is still a
    /// request (with an empty payload).
    pub async fn read_request<R>(&self, reader: &mut R) -> Result<Inbound, GlimpseError>
    where
        R: AsyncRead + Unpin,
    {
        let mut raw = [0u8; MODE_TAG_LEN];
        if read_full(reader, &mut raw[..1]).await? == 0 {
            return Ok(Inbound::Closed);
        }

        if raw[0] == 0 {
            read_exact_or_truncated(reader, &mut raw[1..LENGTH_PREFIX_LEN]).await?;
            if raw[..LENGTH_PREFIX_LEN] != TERMINATION {
                return Err(GlimpseError::MalformedFrame {
                    tag: String::from_utf8_lossy(&raw[..LENGTH_PREFIX_LEN]).into_owned(),
                });
            }
            return Ok(Inbound::Terminate);
        }

        read_exact_or_truncated(reader, &mut raw[1..]).await?;
        let mode = self.parse_tag(&raw)?;
        let length = self.decode_length(reader).await?;
        let payload = self.decode_payload(reader, length).await?;
        Ok(Inbound::Request(Frame { mode, payload }))
    }

    /// Read one reply. A zero length means "no result".
    pub async fn read_response<R>(&self, reader: &mut R) -> Result<ResponseRecord, GlimpseError>
    where
        R: AsyncRead + Unpin,
    {
        let length = self.decode_length(reader).await?;
        if Self::is_termination(length) {
            return Ok(ResponseRecord::default());
        }
        let audio = self.decode_payload(reader, length).await?;
        Ok(ResponseRecord { audio })
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Fill `buf` unless the stream ends first; returns the bytes read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, GlimpseError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn read_exact_or_truncated<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), GlimpseError>
where
    R: AsyncRead + Unpin,
{
    let filled = read_full(reader, buf).await?;
    if filled < buf.len() {
        return Err(GlimpseError::TruncatedFrame {
            expected: buf.len(),
            received: filled,
        });
    }
    Ok(())
}
