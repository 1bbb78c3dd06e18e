use std::fmt::Display;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use linkprims_transport::{StreamListener, StreamSocket, TransportConfig};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::stream::{AckConfig, AckHandshakeStream};

/// Listens for TCP connections and hands out [`AckHandshakeStream`]s.
pub struct AckListener {
    listener: StreamListener,
    config: AckConfig,
    clock: Arc<dyn Clock>,
}

impl AckListener {
    /// Bind and listen on a TCP address.
    pub fn bind(addr: impl ToSocketAddrs + Display) -> Result<Self> {
        Self::bind_with_config(addr, TransportConfig::default())
    }

    /// Bind with explicit accept timing.
    pub fn bind_with_config(
        addr: impl ToSocketAddrs + Display,
        transport: TransportConfig,
    ) -> Result<Self> {
        let listener = StreamListener::bind_with_config(addr, transport)?;
        Ok(Self {
            listener,
            config: AckConfig::default(),
            clock: Arc::new(SystemClock::default()),
        })
    }

    /// Override the configuration given to accepted streams.
    pub fn with_ack_config(mut self, config: AckConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the clock given to accepted streams.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Block until the next connection arrives.
    pub fn accept(&self) -> Result<AckHandshakeStream> {
        let socket = self.listener.accept()?;
        self.wrap(socket)
    }

    /// Wait at most `wait` for a connection. `Ok(None)` when none arrived.
    pub fn accept_timeout(&self, wait: Duration) -> Result<Option<AckHandshakeStream>> {
        match self.listener.accept_timeout(wait)? {
            Some(socket) => self.wrap(socket).map(Some),
            None => Ok(None),
        }
    }

    /// Bound local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    fn wrap(&self, socket: StreamSocket) -> Result<AckHandshakeStream> {
        debug!(peer = ?socket.peer_addr(), "wrapping accepted connection");
        Ok(AckHandshakeStream::with_config(socket, self.config.clone())?
            .with_clock(Arc::clone(&self.clock)))
    }
}
