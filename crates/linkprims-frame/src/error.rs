/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An outbound frame exceeds the configured maximum length.
    #[error("frame too long ({size} bytes, max {max})")]
    FrameTooLong { size: usize, max: usize },

    /// An outbound payload contains the frame delimiter.
    #[error("payload contains the frame delimiter at offset {offset}")]
    EmbeddedDelimiter { offset: usize },

    /// A datagram does not follow the `{sequence}\r\r{payload}` layout.
    #[error("malformed datagram: {0}")]
    MalformedDatagram(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
