use std::fmt::Display;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::StreamSocket;

/// Timing for connection establishment.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// How long a new connection may take to become established. Default: 250 ms.
    pub connect_timeout: Duration,
    /// Granularity of the accept poll. Default: 1 ms.
    pub poll_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(250),
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// TCP listener that hands out [`StreamSocket`]s.
pub struct StreamListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: TransportConfig,
}

impl StreamListener {
    /// Bind and listen on a TCP address.
    pub fn bind(addr: impl ToSocketAddrs + Display) -> Result<Self> {
        Self::bind_with_config(addr, TransportConfig::default())
    }

    /// Bind and listen with explicit timing configuration.
    pub fn bind_with_config(
        addr: impl ToSocketAddrs + Display,
        config: TransportConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
            config,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<StreamSocket> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        StreamSocket::from_tcp(stream)
    }

    /// Poll for an incoming connection for at most `wait`.
    ///
    /// Returns `Ok(None)` when no peer connected in time.
    pub fn accept_timeout(&self, wait: Duration) -> Result<Option<StreamSocket>> {
        self.listener.set_nonblocking(true)?;
        let deadline = Instant::now() + wait;

        let accepted = loop {
            match self.listener.accept() {
                Ok(pair) => break Ok(Some(pair)),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        break Ok(None);
                    }
                    std::thread::sleep(self.config.poll_interval);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => break Err(TransportError::Accept(err)),
            }
        };
        self.listener.set_nonblocking(false)?;

        match accepted? {
            Some((stream, peer)) => {
                // Accepted sockets may inherit non-blocking mode on some platforms.
                stream.set_nonblocking(false)?;
                debug!(%peer, "accepted connection");
                Ok(Some(StreamSocket::from_tcp(stream)?))
            }
            None => Ok(None),
        }
    }

    /// Connect to a listening peer, waiting at most `config.connect_timeout`
    /// for the connection to be established.
    pub fn connect(
        addr: impl ToSocketAddrs + Display,
        config: &TransportConfig,
    ) -> Result<StreamSocket> {
        let name = addr.to_string();
        let candidates = addr.to_socket_addrs().map_err(|e| TransportError::Connect {
            addr: name.clone(),
            source: e,
        })?;

        let mut last_err = None;
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, config.connect_timeout) {
                Ok(stream) => {
                    debug!(peer = %candidate, "connected over tcp");
                    return StreamSocket::from_tcp(stream);
                }
                Err(err) if err.kind() == ErrorKind::TimedOut => {
                    last_err = Some(TransportError::ConnectTimeout {
                        addr: name.clone(),
                        waited: config.connect_timeout,
                    });
                }
                Err(err) => {
                    last_err = Some(TransportError::Connect {
                        addr: name.clone(),
                        source: err,
                    });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| TransportError::Connect {
            addr: name,
            source: std::io::Error::new(ErrorKind::InvalidInput, "address resolved to nothing"),
        }))
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
