use std::fmt;

use bytes::{Buf, Bytes, BytesMut};

use crate::counters::Counters;
use crate::error::Result;

/// Connection state shared by all channel kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Created but not yet connected, or a sync attempt failed.
    Unconnected,
    /// A client datagram channel is waiting for its sync echo.
    Syncing,
    /// Ready to send and receive.
    Connected,
    /// Closed for good; the underlying socket has been released.
    Closed,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Unconnected => "unconnected",
            ChannelState::Syncing => "syncing",
            ChannelState::Connected => "connected",
            ChannelState::Closed => "closed",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte-level view of a channel, for consumers that parse their own input.
///
/// Reads never block: `read` returns `Ok(0)` when nothing has arrived yet.
/// Writes are buffered until the channel's natural message boundary: a `\n`
/// for streams, an explicit [`flush`](ByteChannel::flush) for datagrams.
pub trait ByteChannel {
    /// Copy inbound bytes into `buf`. Returns 0 when none are available.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Queue outbound bytes. Returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Push queued bytes toward the peer.
    fn flush(&mut self) -> Result<()>;

    /// Number of inbound bytes that can be read without waiting.
    fn available(&mut self) -> Result<usize>;

    /// Whether the channel can currently exchange data.
    fn connected(&self) -> bool;

    /// Message counts so far.
    fn counters(&self) -> Counters;
}

/// In-memory channel: reads come from a preloaded buffer, writes are captured.
///
/// Each [`push_inbound`](MemoryChannel::push_inbound) call counts as one
/// received message; each flush of captured output counts as one sent message.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    inbound: BytesMut,
    outbound: BytesMut,
    unflushed: bool,
    counters: Counters,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel whose input is `input`.
    pub fn with_input(input: &[u8]) -> Self {
        let mut channel = Self::new();
        channel.push_inbound(input);
        channel
    }

    /// Append bytes for later reads.
    pub fn push_inbound(&mut self, data: &[u8]) {
        self.inbound.extend_from_slice(data);
        self.counters.record_receive();
    }

    /// Take everything written so far.
    pub fn take_output(&mut self) -> Bytes {
        self.unflushed = false;
        self.outbound.split().freeze()
    }

    /// Borrow everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.outbound
    }
}

impl ByteChannel for MemoryChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = buf.len().min(self.inbound.len());
        buf[..n].copy_from_slice(&self.inbound[..n]);
        self.inbound.advance(n);
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.outbound.extend_from_slice(data);
        self.unflushed |= !data.is_empty();
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        if self.unflushed {
            self.unflushed = false;
            self.counters.record_send();
        }
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.inbound.len())
    }

    fn connected(&self) -> bool {
        true
    }

    fn counters(&self) -> Counters {
        self.counters
    }
}

/// Channel that never yields input and discards all output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChannel;

impl ByteChannel for NullChannel {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(0)
    }

    fn connected(&self) -> bool {
        true
    }

    fn counters(&self) -> Counters {
        Counters::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(channel: &mut dyn ByteChannel) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = channel.read(&mut buf).unwrap();
            if n == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn memory_channel_reads_preloaded_input() {
        let mut channel = MemoryChannel::with_input(b"status\nreset\n");
        assert_eq!(channel.available().unwrap(), 13);
        assert_eq!(drain(&mut channel), b"status\nreset\n");
        assert_eq!(channel.available().unwrap(), 0);
        assert_eq!(channel.counters().received, 1);
    }

    #[test]
    fn memory_channel_captures_output() {
        let mut channel = MemoryChannel::new();
        channel.write(b"ok").unwrap();
        channel.write(b"\n").unwrap();
        channel.flush().unwrap();
        channel.flush().unwrap();

        assert_eq!(channel.output(), b"ok\n");
        assert_eq!(channel.counters().sent, 1);
        assert_eq!(channel.take_output().as_ref(), b"ok\n");
        assert!(channel.output().is_empty());
    }

    #[test]
    fn null_channel_discards_everything() {
        let mut channel = NullChannel;
        assert_eq!(channel.write(b"ignored").unwrap(), 7);
        channel.flush().unwrap();
        assert_eq!(drain(&mut channel), b"");
        assert!(channel.connected());
        assert_eq!(channel.counters(), Counters::default());
    }

    #[test]
    fn channels_are_interchangeable_behind_the_trait() {
        let mut channels: Vec<Box<dyn ByteChannel>> = vec![
            Box::new(MemoryChannel::with_input(b"x")),
            Box::new(NullChannel),
        ];
        let total: usize = channels
            .iter_mut()
            .map(|c| c.available().unwrap())
            .sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn state_display() {
        assert_eq!(ChannelState::Syncing.to_string(), "syncing");
        assert_eq!(ChannelState::Closed.as_str(), "closed");
    }
}
