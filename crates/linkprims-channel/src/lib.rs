//! Reliable-ish message delivery over unreliable sockets.
//!
//! Two channel types turn raw sockets into line-oriented message channels:
//! - [`AckHandshakeStream`]: every outbound frame waits for a `#ACK#` frame
//!   from the peer; a missing or wrong ack closes the connection.
//! - [`SequencedDatagramChannel`]: every datagram carries a sequence number;
//!   stale and duplicate datagrams are dropped after a one-time sync handshake.
//!
//! Both implement [`ByteChannel`], as do the in-memory [`MemoryChannel`] and
//! the discarding [`NullChannel`], so a command dispatcher can treat them
//! uniformly.

pub mod channel;
pub mod clock;
pub mod counters;
pub mod datagram;
pub mod error;
pub mod listener;
pub mod stream;

pub use channel::{ByteChannel, ChannelState, MemoryChannel, NullChannel};
pub use clock::{BoundedWait, Clock, ManualClock, SystemClock};
pub use counters::Counters;
pub use datagram::{DatagramConfig, Role, SequencedDatagramChannel};
pub use error::{ChannelError, Result};
pub use listener::AckListener;
pub use stream::{AckConfig, AckHandshakeStream, ACK_SENTINEL};
