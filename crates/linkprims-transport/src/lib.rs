//! Socket handles for linkprims channels.
//!
//! Provides the two unreliable primitives everything else builds on:
//! - a connected byte stream ([`StreamSocket`], TCP or a Unix socket pair)
//! - a connectionless datagram socket ([`DatagramSocket`], UDP)
//!
//! Channels are written against the [`StreamTransport`] and
//! [`DatagramTransport`] traits so tests can substitute in-memory fakes.

pub mod datagram;
pub mod error;
pub mod stream;
pub mod tcp;

pub use datagram::{DatagramSocket, DatagramTransport};
pub use error::{Result, TransportError};
pub use stream::{StreamSocket, StreamTransport};
pub use tcp::{StreamListener, TransportConfig};
