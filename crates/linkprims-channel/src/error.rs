use std::time::Duration;

use linkprims_transport::TransportError;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] linkprims_frame::FrameError),

    /// The peer did not acknowledge a frame; the connection has been closed.
    #[error("ack handshake failed: {0}")]
    HandshakeFailed(String),

    /// The datagram sync handshake got no echo in time.
    #[error("no sync echo within {0:?}")]
    SyncFailed(Duration),

    /// No frame arrived within the read timeout.
    #[error("no frame within {0:?}")]
    Timeout(Duration),

    /// The channel has been closed; reconnect to continue.
    #[error("channel closed")]
    Closed,

    /// The channel has not completed `begin()`.
    #[error("channel not connected")]
    NotConnected,

    /// A server channel has no peer address to reply to yet.
    #[error("no peer to send to")]
    NoPeer,

    /// The client sequence counter cannot advance without overflowing.
    #[error("sequence number exhausted")]
    SequenceExhausted,
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        ChannelError::Transport(TransportError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
