//! Newline-delimited message framing for linkprims.
//!
//! Two wire formats live here:
//! - stream frames: payload bytes terminated by `\n`, with `\r` dropped on decode
//! - sequenced datagrams: `{sequence}\r\r{payload}`
//!
//! [`FrameCodec`] assembles frames one byte at a time from an unbounded
//! stream and never holds more than the configured frame length.

pub mod codec;
pub mod datagram;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod line_codec;

pub use codec::{
    encode_frame, FrameCodec, FrameConfig, CARRIAGE_RETURN, DEFAULT_MAX_FRAME_LEN, DELIMITER,
};
pub use datagram::{
    decode_datagram, encode_datagram, Datagram, DEFAULT_MAX_DATAGRAM, SEQUENCE_MARKER,
    SYNC_DATAGRAM, SYNC_SEQUENCE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;

#[cfg(feature = "async")]
pub use line_codec::LineCodec;
