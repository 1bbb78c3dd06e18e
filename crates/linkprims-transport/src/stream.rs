use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// Operations a connected byte stream must offer to back a channel.
///
/// Implemented by [`StreamSocket`]; tests implement it for scripted fakes.
pub trait StreamTransport: Read + Write {
    /// Set the blocking read timeout. `None` blocks indefinitely.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;

    /// Switch the stream between blocking and non-blocking mode.
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;

    /// Close both directions of the stream.
    fn shutdown(&self) -> io::Result<()>;

    /// Read whatever arrives within `wait`.
    ///
    /// `None` (or a zero wait) polls without blocking. Returns `Ok(None)` when
    /// nothing arrived in time and `Ok(Some(0))` when the peer closed the stream.
    fn read_within(&mut self, buf: &mut [u8], wait: Option<Duration>) -> io::Result<Option<usize>> {
        let polling = match wait {
            Some(wait) if !wait.is_zero() => {
                self.set_read_timeout(Some(wait))?;
                false
            }
            _ => {
                self.set_nonblocking(true)?;
                true
            }
        };

        let result = loop {
            match self.read(buf) {
                Ok(n) => break Ok(Some(n)),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    break Ok(None)
                }
                Err(err) => break Err(err),
            }
        };

        if polling {
            self.set_nonblocking(false)?;
        }
        result
    }
}

/// A connected byte stream implementing `Read` and `Write`.
///
/// Wraps a TCP stream, or on Unix one end of a connected socket pair.
pub struct StreamSocket {
    inner: StreamSocketInner,
}

enum StreamSocketInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for StreamSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            StreamSocketInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            StreamSocketInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for StreamSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.inner {
            StreamSocketInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            StreamSocketInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            StreamSocketInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            StreamSocketInner::Unix(stream) => stream.flush(),
        }
    }
}

impl StreamTransport for StreamSocket {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match &self.inner {
            StreamSocketInner::Tcp(stream) => stream.set_read_timeout(timeout),
            #[cfg(unix)]
            StreamSocketInner::Unix(stream) => stream.set_read_timeout(timeout),
        }
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match &self.inner {
            StreamSocketInner::Tcp(stream) => stream.set_nonblocking(nonblocking),
            #[cfg(unix)]
            StreamSocketInner::Unix(stream) => stream.set_nonblocking(nonblocking),
        }
    }

    fn shutdown(&self) -> io::Result<()> {
        let result = match &self.inner {
            StreamSocketInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            StreamSocketInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        // The peer may already have gone away.
        match result {
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl StreamSocket {
    /// Wrap a connected TCP stream. Nagle is disabled so each frame leaves at once.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            inner: StreamSocketInner::Tcp(stream),
        })
    }

    /// Wrap one end of a connected Unix socket.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: StreamSocketInner::Unix(stream),
        }
    }

    /// Create a connected pair of in-process stream sockets.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Address of the remote end, when the stream is TCP.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &self.inner {
            StreamSocketInner::Tcp(stream) => stream.peer_addr().ok(),
            #[cfg(unix)]
            StreamSocketInner::Unix(_) => None,
        }
    }
}

impl std::fmt::Debug for StreamSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            StreamSocketInner::Tcp(stream) => f
                .debug_struct("StreamSocket")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
            #[cfg(unix)]
            StreamSocketInner::Unix(_) => {
                f.debug_struct("StreamSocket").field("type", &"unix").finish()
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn pair_carries_bytes_both_ways() {
        let (mut left, mut right) = StreamSocket::pair().unwrap();

        left.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        right.write_all(b"pong").unwrap();
        left.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn read_within_poll_returns_none_when_idle() {
        let (_left, mut right) = StreamSocket::pair().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(right.read_within(&mut buf, None).unwrap(), None);
    }

    #[test]
    fn read_within_times_out() {
        let (_left, mut right) = StreamSocket::pair().unwrap();
        let mut buf = [0u8; 8];
        let got = right
            .read_within(&mut buf, Some(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn read_within_returns_buffered_data() {
        let (mut left, mut right) = StreamSocket::pair().unwrap();
        left.write_all(b"abc").unwrap();

        let mut buf = [0u8; 8];
        let got = right
            .read_within(&mut buf, Some(Duration::from_millis(200)))
            .unwrap();
        assert_eq!(got, Some(3));
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn read_within_reports_eof_after_shutdown() {
        let (left, mut right) = StreamSocket::pair().unwrap();
        left.shutdown().unwrap();

        let mut buf = [0u8; 8];
        let got = right
            .read_within(&mut buf, Some(Duration::from_millis(200)))
            .unwrap();
        assert_eq!(got, Some(0));
    }

    #[test]
    fn poll_restores_blocking_mode() {
        let (mut left, mut right) = StreamSocket::pair().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(right.read_within(&mut buf, None).unwrap(), None);

        left.write_all(b"x").unwrap();
        // Blocking read must wait for data instead of failing with WouldBlock.
        let n = right.read(&mut buf).unwrap();
        assert_eq!(n, 1);
    }
}
