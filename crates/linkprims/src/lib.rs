//! Acknowledged streams and sequenced datagrams over unreliable sockets.
//!
//! linkprims gives small devices and their controllers a line-oriented
//! message channel with one of two delivery guarantees: every frame
//! acknowledged (over TCP), or stale and duplicate datagrams dropped
//! (over UDP).
//!
//! # Crate Structure
//!
//! - [`transport`]: Socket handles and the listener/connect poll
//! - [`frame`]: Newline framing and the sequenced datagram format
//! - [`channel`]: Ack handshake streams, sequenced datagram channels, and
//!   the in-memory and null byte channels

/// Re-export transport types.
pub mod transport {
    pub use linkprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use linkprims_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use linkprims_channel::*;
}
