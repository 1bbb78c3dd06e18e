use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Separates the decimal sequence number from the payload.
pub const SEQUENCE_MARKER: &[u8; 2] = b"\r\r";

/// Sequence number reserved for the sync handshake.
pub const SYNC_SEQUENCE: i64 = -1;

/// The complete sync request/echo datagram.
pub const SYNC_DATAGRAM: &[u8] = b"-1\r\r\n";

/// Default maximum datagram size in bytes.
pub const DEFAULT_MAX_DATAGRAM: usize = 1500;

/// A decoded sequenced datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Sender's sequence number.
    pub sequence: i64,
    /// Everything after the sequence marker, verbatim.
    pub payload: Bytes,
}

impl Datagram {
    /// Whether this datagram is a sync request or sync echo.
    pub fn is_sync(&self) -> bool {
        self.sequence == SYNC_SEQUENCE
    }
}

/// Encode a datagram.
///
/// Wire format:
/// ```text
/// ┌──────────────────────┬────────┬─────────────────────┐
/// │ Sequence (ASCII dec) │ \r\r   │ Payload (verbatim)  │
/// └──────────────────────┴────────┴─────────────────────┘
/// ```
///
/// The payload may contain single `\r` and `\n` bytes freely.
pub fn encode_datagram(sequence: i64, payload: &[u8], dst: &mut BytesMut) {
    let header = sequence.to_string();
    dst.reserve(header.len() + SEQUENCE_MARKER.len() + payload.len());
    dst.put_slice(header.as_bytes());
    dst.put_slice(SEQUENCE_MARKER);
    dst.put_slice(payload);
}

/// Decode a received datagram.
///
/// The first `\r\r` ends the sequence field. A missing marker or a sequence
/// that is not a decimal `i64` is reported as [`FrameError::MalformedDatagram`].
pub fn decode_datagram(raw: Bytes) -> Result<Datagram> {
    let marker = raw
        .windows(SEQUENCE_MARKER.len())
        .position(|w| w == SEQUENCE_MARKER)
        .ok_or_else(|| FrameError::MalformedDatagram("missing sequence marker".to_string()))?;

    let header = std::str::from_utf8(&raw[..marker])
        .map_err(|_| FrameError::MalformedDatagram("sequence is not ASCII".to_string()))?;
    let sequence = header.parse::<i64>().map_err(|err| {
        FrameError::MalformedDatagram(format!("invalid sequence {header:?}: {err}"))
    })?;

    Ok(Datagram {
        sequence,
        payload: raw.slice(marker + SEQUENCE_MARKER.len()..),
    })
}
