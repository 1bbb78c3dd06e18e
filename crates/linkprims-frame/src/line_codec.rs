use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, FrameCodec, DEFAULT_MAX_FRAME_LEN};
use crate::error::{FrameError, Result};

/// `tokio_util` codec for newline frames.
///
/// Applies the same rules as [`FrameCodec`]: `\r` is dropped and over-long
/// frames are discarded through the next delimiter.
#[derive(Debug)]
pub struct LineCodec {
    codec: FrameCodec,
}

impl LineCodec {
    /// Create a codec bounded to `max_frame_len` payload bytes.
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            codec: FrameCodec::new(max_frame_len),
        }
    }

    /// Number of over-long frames discarded so far.
    pub fn overflows(&self) -> u64 {
        self.codec.overflows()
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        Ok(self.codec.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if self.codec.pending_len() == 0 => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<&[u8]> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<()> {
        let max = self.codec.max_frame_len();
        if item.len() > max {
            return Err(FrameError::FrameTooLong {
                size: item.len(),
                max,
            });
        }
        encode_frame(item, dst)
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        Encoder::<&[u8]>::encode(self, item.as_ref(), dst)
    }
}
