use std::fmt::Display;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use linkprims_frame::{
    FrameConfig, FrameError, FrameReader, FrameWriter, DEFAULT_MAX_FRAME_LEN, DELIMITER,
};
use linkprims_transport::{StreamListener, StreamSocket, StreamTransport, TransportConfig};
use tracing::{debug, trace, warn};

use crate::channel::{ByteChannel, ChannelState};
use crate::clock::{BoundedWait, Clock, SystemClock};
use crate::counters::Counters;
use crate::error::{ChannelError, Result};

/// Payload of the acknowledgement frame (`#ACK#\n` on the wire).
pub const ACK_SENTINEL: &[u8] = b"#ACK#";

/// Timing and size limits for an [`AckHandshakeStream`].
#[derive(Debug, Clone)]
pub struct AckConfig {
    /// How long a sender waits for the peer's ack. Default: 5 s.
    pub ack_timeout: Duration,
    /// How long a blocking receive waits for a frame. Default: 1 s.
    pub user_timeout: Duration,
    /// Maximum frame length in either direction. Default: 255.
    pub max_frame_len: usize,
}

impl Default for AckConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(5000),
            user_timeout: Duration::from_millis(1000),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl AckConfig {
    /// Socket-level framing. Never tighter than the ack frame itself.
    fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_len: self.max_frame_len.max(ACK_SENTINEL.len()),
            read_timeout: Some(self.user_timeout),
        }
    }
}

/// Byte stream where every outbound frame must be acknowledged.
///
/// Writing a `\n` sends the buffered frame and then blocks for up to
/// `ack_timeout` until the peer answers with exactly `#ACK#`. Anything else
/// (a different frame, silence, or the peer hanging up) closes the
/// connection, after which every operation fails with
/// [`ChannelError::Closed`].
///
/// Each frame received from the peer is answered with an ack before it is
/// handed to the caller. Ack frames arriving outside an ack wait are late
/// answers to an abandoned wait and are dropped without a reply.
///
/// The exchange is half-duplex: a data frame that arrives while this end is
/// waiting for an ack fails the handshake, so peers must take turns.
pub struct AckHandshakeStream<S: StreamTransport = StreamSocket> {
    reader: Option<FrameReader<S>>,
    outbound: BytesMut,
    /// Dropping the rest of an over-long outbound frame.
    discarding: bool,
    delivered: BytesMut,
    config: AckConfig,
    counters: Counters,
    clock: Arc<dyn Clock>,
}

impl AckHandshakeStream<StreamSocket> {
    /// Connect over TCP, waiting at most `transport.connect_timeout` for the
    /// connection to be established.
    pub fn connect(
        addr: impl ToSocketAddrs + Display,
        config: AckConfig,
        transport: &TransportConfig,
    ) -> Result<Self> {
        let socket = StreamListener::connect(addr, transport)?;
        Self::with_config(socket, config)
    }
}

impl<S: StreamTransport> AckHandshakeStream<S> {
    /// Wrap a connected socket with default configuration.
    pub fn new(socket: S) -> Result<Self> {
        Self::with_config(socket, AckConfig::default())
    }

    /// Wrap a connected socket with explicit configuration.
    pub fn with_config(socket: S, config: AckConfig) -> Result<Self> {
        let frame_config = config.frame_config();
        let reader = FrameReader::with_config_socket(socket, frame_config)?;
        debug!(
            ack_timeout_ms = config.ack_timeout.as_millis() as u64,
            user_timeout_ms = config.user_timeout.as_millis() as u64,
            "ack stream ready"
        );
        Ok(Self {
            reader: Some(reader),
            outbound: BytesMut::with_capacity(config.max_frame_len),
            discarding: false,
            delivered: BytesMut::new(),
            config,
            counters: Counters::default(),
            clock: Arc::new(SystemClock::default()),
        })
    }

    /// Measure timeouts with `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Send one frame: `payload` followed by the delimiter.
    ///
    /// Returns once the peer has acknowledged. A `\n` inside `payload` ends
    /// a frame early, and each frame so produced is acknowledged separately.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if let Err(err) = self.write(payload) {
            // The rejected frame ends with this call.
            self.discarding = false;
            return Err(err);
        }
        self.write(&[DELIMITER])?;
        Ok(())
    }

    /// Buffer outbound bytes, transmitting a frame at every `\n`.
    ///
    /// Returns `data.len()` when every completed frame was acknowledged.
    /// A frame growing past `max_frame_len` is reported as
    /// [`FrameError::FrameTooLong`] and dropped through its `\n`, including
    /// bytes supplied by later calls; the connection stays open.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        let mut overflow = None;
        for &byte in data {
            if byte == DELIMITER {
                if self.discarding {
                    self.discarding = false;
                    trace!("over-long outbound frame dropped");
                } else {
                    self.transmit_frame()?;
                }
                continue;
            }
            if self.discarding {
                continue;
            }
            if self.outbound.len() >= self.config.max_frame_len {
                overflow = Some(FrameError::FrameTooLong {
                    size: self.outbound.len() + 1,
                    max: self.config.max_frame_len,
                });
                self.outbound.clear();
                self.discarding = true;
                continue;
            }
            self.outbound.put_u8(byte);
        }
        match overflow {
            Some(err) => Err(err.into()),
            None => Ok(data.len()),
        }
    }

    /// Wait up to `user_timeout` for the next frame from the peer.
    ///
    /// The frame is acknowledged before it is returned. Returns
    /// [`ChannelError::Timeout`] when nothing arrives in time; the
    /// connection stays open.
    pub fn recv(&mut self) -> Result<Bytes> {
        self.recv_within(self.config.user_timeout)?
            .ok_or(ChannelError::Timeout(self.config.user_timeout))
    }

    /// Return the next frame if one can be completed without waiting.
    pub fn try_recv(&mut self) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        if let Some(rest) = self.take_delivered() {
            return Ok(Some(rest));
        }
        loop {
            match self.read_frame(None)? {
                Some(frame) if frame.as_ref() == ACK_SENTINEL => {
                    trace!("dropping ack outside an ack wait");
                }
                Some(frame) => return self.accept_frame(frame).map(Some),
                None => return Ok(None),
            }
        }
    }

    /// Wait up to `timeout` for the next frame. `Ok(None)` on timeout.
    pub fn recv_within(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        if let Some(rest) = self.take_delivered() {
            return Ok(Some(rest));
        }
        let outcome = self.wait_for_frame(timeout);
        self.restore_user_timeout()?;
        outcome
    }

    /// Change how long blocking receives wait.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.config.user_timeout = timeout;
        self.restore_user_timeout()
    }

    /// Change how long a sender waits for an ack.
    pub fn set_ack_timeout(&mut self, timeout: Duration) {
        self.config.ack_timeout = timeout;
    }

    /// Frames sent so far, acks included.
    pub fn send_count(&self) -> u64 {
        self.counters.sent
    }

    /// Frames received so far, acks included.
    pub fn receive_count(&self) -> u64 {
        self.counters.received
    }

    pub fn config(&self) -> &AckConfig {
        &self.config
    }

    pub fn state(&self) -> ChannelState {
        if self.reader.is_some() {
            ChannelState::Connected
        } else {
            ChannelState::Closed
        }
    }

    /// Borrow the underlying socket, if still open.
    pub fn get_ref(&self) -> Option<&S> {
        self.reader.as_ref().map(FrameReader::get_ref)
    }

    /// Shut down and release the socket. Idempotent.
    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            if let Err(err) = reader.get_ref().shutdown() {
                debug!(error = %err, "shutdown on close failed");
            }
            debug!(
                sent = self.counters.sent,
                received = self.counters.received,
                "ack stream closed"
            );
        }
        self.outbound.clear();
        self.discarding = false;
        self.delivered.clear();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.reader.is_none() {
            return Err(ChannelError::Closed);
        }
        Ok(())
    }

    fn take_delivered(&mut self) -> Option<Bytes> {
        if self.delivered.is_empty() {
            return None;
        }
        let mut rest = self.delivered.split();
        if rest.last() == Some(&DELIMITER) {
            rest.truncate(rest.len() - 1);
        }
        Some(rest.freeze())
    }

    fn wait_for_frame(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        let clock = Arc::clone(&self.clock);
        let wait = BoundedWait::new(clock.as_ref(), timeout);
        loop {
            match self.read_frame(wait.remaining())? {
                Some(frame) if frame.as_ref() == ACK_SENTINEL => {
                    trace!("dropping ack outside an ack wait");
                }
                Some(frame) => return self.accept_frame(frame).map(Some),
                None if wait.expired() => return Ok(None),
                None => {}
            }
        }
    }

    /// Bounded waits leave their own timeout on the socket.
    fn restore_user_timeout(&self) -> Result<()> {
        if let Some(reader) = self.reader.as_ref() {
            reader
                .get_ref()
                .set_read_timeout(Some(self.config.user_timeout))?;
        }
        Ok(())
    }

    /// One bounded frame read. A peer hang-up closes the stream.
    fn read_frame(&mut self, wait: Option<Duration>) -> Result<Option<Bytes>> {
        let reader = self.reader.as_mut().ok_or(ChannelError::Closed)?;
        match reader.read_frame_within(wait) {
            Ok(frame) => Ok(frame),
            Err(FrameError::ConnectionClosed) => {
                debug!("peer closed the stream");
                self.close();
                Err(ChannelError::Closed)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        let frame_config = self.config.frame_config();
        let reader = self.reader.as_mut().ok_or(ChannelError::Closed)?;
        let result = FrameWriter::with_config(reader.get_mut(), frame_config).send(payload);
        if let Err(err) = result {
            warn!(error = %err, "frame write failed, closing");
            self.close();
            return Err(err.into());
        }
        self.counters.record_send();
        Ok(())
    }

    /// Acknowledge a received frame, then hand it over.
    fn accept_frame(&mut self, frame: Bytes) -> Result<Bytes> {
        self.counters.record_receive();
        self.write_frame(ACK_SENTINEL)?;
        trace!(len = frame.len(), "frame acknowledged");
        Ok(frame)
    }

    fn transmit_frame(&mut self) -> Result<()> {
        let frame = self.outbound.split().freeze();
        self.write_frame(&frame)?;
        trace!(len = frame.len(), "frame sent, awaiting ack");

        match self.await_ack() {
            Ok(()) => {
                self.counters.record_receive();
                self.restore_user_timeout()
            }
            Err(err) => {
                warn!(error = %err, "ack handshake failed, closing");
                self.close();
                Err(err)
            }
        }
    }

    /// Frames read here bypass `accept_frame`, so the ack is never acked.
    fn await_ack(&mut self) -> Result<()> {
        let timeout = self.config.ack_timeout;
        let clock = Arc::clone(&self.clock);
        let wait = BoundedWait::new(clock.as_ref(), timeout);
        let reader = self.reader.as_mut().ok_or(ChannelError::Closed)?;

        loop {
            match reader.read_frame_within(wait.remaining()) {
                Ok(Some(frame)) if frame.as_ref() == ACK_SENTINEL => return Ok(()),
                Ok(Some(frame)) => {
                    return Err(ChannelError::HandshakeFailed(format!(
                        "expected ack, got {:?}",
                        String::from_utf8_lossy(&frame)
                    )));
                }
                Ok(None) => {}
                Err(FrameError::ConnectionClosed) => {
                    return Err(ChannelError::HandshakeFailed(
                        "peer closed the stream before acknowledging".to_string(),
                    ));
                }
                Err(err) => return Err(err.into()),
            }
            if wait.expired() {
                return Err(ChannelError::HandshakeFailed(format!(
                    "no ack within {timeout:?}"
                )));
            }
        }
    }
}

impl<S: StreamTransport> ByteChannel for AckHandshakeStream<S> {
    /// Delivers each received frame followed by `\n`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.available()?;
        let n = buf.len().min(self.delivered.len());
        buf[..n].copy_from_slice(&self.delivered[..n]);
        self.delivered.advance(n);
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        AckHandshakeStream::write(self, data)
    }

    /// Flushes the socket. A partial frame stays buffered until its `\n`.
    fn flush(&mut self) -> Result<()> {
        let reader = self.reader.as_mut().ok_or(ChannelError::Closed)?;
        std::io::Write::flush(reader.get_mut())?;
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        if self.delivered.is_empty() {
            if let Some(frame) = self.try_recv()? {
                self.delivered.extend_from_slice(&frame);
                self.delivered.put_u8(DELIMITER);
            }
        }
        Ok(self.delivered.len())
    }

    fn connected(&self) -> bool {
        self.reader.is_some()
    }

    fn counters(&self) -> Counters {
        self.counters
    }
}

impl<S: StreamTransport> Drop for AckHandshakeStream<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: StreamTransport> std::fmt::Debug for AckHandshakeStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckHandshakeStream")
            .field("state", &self.state())
            .field("pending", &self.outbound.len())
            .field("counters", &self.counters)
            .finish()
    }
}
