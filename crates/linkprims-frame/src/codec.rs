use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::error::{FrameError, Result};

/// Frame terminator.
pub const DELIMITER: u8 = b'\n';

/// Dropped on decode wherever it appears.
pub const CARRIAGE_RETURN: u8 = b'\r';

/// Default maximum frame length in bytes (terminator and `\r` excluded).
pub const DEFAULT_MAX_FRAME_LEN: usize = 255;

/// Incremental newline frame assembler.
///
/// Overflow contract: when a frame grows past `max_frame_len`, everything
/// collected so far and every further byte up to and including the next
/// delimiter is discarded. Framing resumes cleanly after that delimiter, so a
/// partial or spliced frame is never delivered. Discards are counted in
/// [`FrameCodec::overflows`] and are not reported as errors.
#[derive(Debug)]
pub struct FrameCodec {
    buf: BytesMut,
    max_frame_len: usize,
    discarding: bool,
    overflows: u64,
}

impl FrameCodec {
    /// Create an assembler bounded to `max_frame_len` payload bytes.
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_frame_len.min(4096)),
            max_frame_len,
            discarding: false,
            overflows: 0,
        }
    }

    /// Feed one byte. Returns the completed frame when `byte` is the delimiter.
    pub fn append_byte(&mut self, byte: u8) -> Option<Bytes> {
        match byte {
            CARRIAGE_RETURN => None,
            DELIMITER => {
                if self.discarding {
                    self.discarding = false;
                    return None;
                }
                Some(self.buf.split().freeze())
            }
            _ if self.discarding => None,
            _ => {
                if self.buf.len() >= self.max_frame_len {
                    self.buf.clear();
                    self.discarding = true;
                    self.overflows += 1;
                    debug!(max = self.max_frame_len, "frame overflow, discarding to next delimiter");
                    return None;
                }
                self.buf.put_u8(byte);
                None
            }
        }
    }

    /// Consume bytes from `src` until one frame completes.
    ///
    /// Bytes after the completed frame stay in `src`. Returns `None` once
    /// `src` is exhausted without completing a frame.
    pub fn decode(&mut self, src: &mut BytesMut) -> Option<Bytes> {
        while src.has_remaining() {
            if let Some(frame) = self.append_byte(src.get_u8()) {
                return Some(frame);
            }
        }
        None
    }

    /// Bytes collected toward the frame in progress.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Number of frames discarded for exceeding the maximum length.
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Configured maximum frame length.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Drop the frame in progress and any pending discard.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────────────────────────┬──────┐
/// │ Payload (verbatim)      │ \n   │
/// └─────────────────────────┴──────┘
/// ```
///
/// There is no escaping, so a payload containing `\n` is rejected.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if let Some(offset) = payload.iter().position(|&b| b == DELIMITER) {
        return Err(FrameError::EmbeddedDelimiter { offset });
    }
    dst.reserve(payload.len() + 1);
    dst.put_slice(payload);
    dst.put_u8(DELIMITER);
    Ok(())
}

/// Configuration for frame reading and writing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame length in bytes. Default: 255.
    pub max_frame_len: usize,
    /// Read timeout applied to sockets by [`FrameReader::with_config_socket`].
    ///
    /// [`FrameReader::with_config_socket`]: crate::FrameReader::with_config_socket
    pub read_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            read_timeout: None,
        }
    }
}
