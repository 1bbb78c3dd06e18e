use std::time::Duration;

use bytes::{Bytes, BytesMut};
use linkprims_transport::StreamTransport;

use crate::codec::{FrameCodec, FrameConfig};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 512;

/// Reads complete frames from a connected stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// Bytes read past the end of a frame are kept for the next call.
pub struct FrameReader<T> {
    inner: T,
    pending: BytesMut,
    codec: FrameCodec,
}

impl<T: StreamTransport> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    ///
    /// The read timeout in `config` is not applied; see
    /// [`with_config_socket`](Self::with_config_socket).
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            pending: BytesMut::with_capacity(READ_CHUNK_SIZE),
            codec: FrameCodec::new(config.max_frame_len),
        }
    }

    /// Create a frame reader for a socket and apply the read timeout from config.
    pub fn with_config_socket(inner: T, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }

    /// Try to complete a frame with at most one socket read bounded by `wait`.
    ///
    /// Buffered bytes are decoded first, without touching the socket. `None`
    /// polls. Returns `Ok(None)` when no frame completed within the wait, and
    /// `Err(FrameError::ConnectionClosed)` when the peer closed the stream.
    pub fn read_frame_within(&mut self, wait: Option<Duration>) -> Result<Option<Bytes>> {
        if let Some(frame) = self.codec.decode(&mut self.pending) {
            return Ok(Some(frame));
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match self.inner.read_within(&mut chunk, wait)? {
            None => Ok(None),
            Some(0) => Err(FrameError::ConnectionClosed),
            Some(n) => {
                self.pending.extend_from_slice(&chunk[..n]);
                Ok(self.codec.decode(&mut self.pending))
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};

    use super::*;

    const WAIT: Option<Duration> = Some(Duration::from_secs(2));

    /// Hands out one scripted chunk per read, then reports end of stream.
    struct Chunked {
        chunks: VecDeque<Vec<u8>>,
    }

    impl Chunked {
        fn new(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            }
        }
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            if chunk.is_empty() {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    impl Write for Chunked {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl StreamTransport for Chunked {
        fn set_read_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }

        fn set_nonblocking(&self, _nonblocking: bool) -> io::Result<()> {
            Ok(())
        }

        fn shutdown(&self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn frame_split_across_reads() {
        let mut reader = FrameReader::new(Chunked::new(&["sl", "o", "w\r\n"]));

        assert!(reader.read_frame_within(WAIT).unwrap().is_none());
        assert!(reader.read_frame_within(WAIT).unwrap().is_none());
        assert_eq!(
            reader.read_frame_within(WAIT).unwrap().unwrap().as_ref(),
            b"slow"
        );
    }

    #[test]
    fn buffered_frames_served_before_next_read() {
        let mut reader = FrameReader::new(Chunked::new(&["one\ntwo\nthree\n"]));

        assert_eq!(reader.read_frame_within(WAIT).unwrap().unwrap().as_ref(), b"one");
        assert_eq!(reader.read_frame_within(None).unwrap().unwrap().as_ref(), b"two");
        assert_eq!(reader.read_frame_within(None).unwrap().unwrap().as_ref(), b"three");
        assert!(matches!(
            reader.read_frame_within(None).unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn idle_stream_yields_none() {
        let mut reader = FrameReader::new(Chunked::new(&[""]));
        assert!(reader.read_frame_within(None).unwrap().is_none());
    }

    #[test]
    fn close_mid_frame_is_reported() {
        let mut reader = FrameReader::new(Chunked::new(&["only-part"]));

        assert!(reader.read_frame_within(WAIT).unwrap().is_none());
        let err = reader.read_frame_within(WAIT).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn oversized_frame_is_skipped() {
        let cfg = FrameConfig {
            max_frame_len: 4,
            ..FrameConfig::default()
        };
        let mut reader =
            FrameReader::with_config(Chunked::new(&["far-too-", "long\nok\n"]), cfg);

        assert!(reader.read_frame_within(WAIT).unwrap().is_none());
        assert_eq!(reader.read_frame_within(WAIT).unwrap().unwrap().as_ref(), b"ok");
    }

    #[cfg(unix)]
    #[test]
    fn read_frame_within_times_out_then_completes() {
        let (mut left, right) = linkprims_transport::StreamSocket::pair().unwrap();
        let mut reader = FrameReader::new(right);

        let got = reader
            .read_frame_within(Some(Duration::from_millis(10)))
            .unwrap();
        assert!(got.is_none());

        left.write_all(b"late\n").unwrap();
        let got = reader.read_frame_within(WAIT).unwrap();
        assert_eq!(got.unwrap().as_ref(), b"late");
    }

    #[cfg(unix)]
    #[test]
    fn read_frame_within_reports_peer_close() {
        let (left, right) = linkprims_transport::StreamSocket::pair().unwrap();
        let mut reader = FrameReader::new(right);
        drop(left);

        let err = reader.read_frame_within(WAIT).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[cfg(unix)]
    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = linkprims_transport::StreamSocket::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.send(b"ping").unwrap();
        writer.send(b"pong\r").unwrap();

        let mut frames = Vec::new();
        while frames.len() < 2 {
            if let Some(frame) = reader.read_frame_within(WAIT).unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames[0].as_ref(), b"ping");
        assert_eq!(frames[1].as_ref(), b"pong");
    }
}
