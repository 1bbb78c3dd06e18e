use std::fmt::Display;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

/// Connectionless datagram transport used by sequenced datagram channels.
///
/// Implementors must provide send/receive operations addressed by `SocketAddr`.
pub trait DatagramTransport {
    /// Send `buf` to `target` as one datagram.
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Receive one datagram, waiting at most `wait`.
    ///
    /// `None` (or a zero wait) polls without blocking. Returns `Ok(None)` when
    /// no datagram arrived in time.
    fn recv_from(
        &self,
        buf: &mut [u8],
        wait: Option<Duration>,
    ) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Return the local address this transport is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// UDP socket handle.
#[derive(Debug)]
pub struct DatagramSocket {
    socket: UdpSocket,
}

impl DatagramSocket {
    /// Bind a UDP socket to `addr`.
    pub fn bind(addr: impl ToSocketAddrs + Display) -> Result<Self> {
        let socket = UdpSocket::bind(&addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(local = ?socket.local_addr().ok(), "bound udp socket");
        Ok(Self { socket })
    }

    /// Wrap an existing `UdpSocket`.
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }
}

impl DatagramTransport for DatagramSocket {
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, target)
    }

    fn recv_from(
        &self,
        buf: &mut [u8],
        wait: Option<Duration>,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        match wait {
            Some(wait) if !wait.is_zero() => {
                self.socket.set_nonblocking(false)?;
                self.socket.set_read_timeout(Some(wait))?;
            }
            _ => self.socket.set_nonblocking(true)?,
        }

        loop {
            match self.socket.recv_from(buf) {
                Ok(received) => return Ok(Some(received)),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    return Ok(None)
                }
                // ICMP port-unreachable from an earlier send can surface here.
                Err(err)
                    if err.kind() == ErrorKind::ConnectionReset
                        || err.kind() == ErrorKind::ConnectionRefused =>
                {
                    return Ok(None)
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
