use std::fmt::Display;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use linkprims_frame::{
    decode_datagram, encode_datagram, Datagram, FrameError, DEFAULT_MAX_DATAGRAM,
    SEQUENCE_MARKER, SYNC_DATAGRAM,
};
use linkprims_transport::{DatagramSocket, DatagramTransport};
use tracing::{debug, info, trace};

use crate::channel::{ByteChannel, ChannelState};
use crate::clock::{BoundedWait, Clock, SystemClock};
use crate::counters::Counters;
use crate::error::{ChannelError, Result};

/// Widest sequence header: `-9223372036854775808`.
const MAX_SEQUENCE_DIGITS: usize = 20;

/// Which end of a datagram channel this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepts any sender; replies to whoever sent the last accepted datagram.
    Server,
    /// Talks to exactly one remote address.
    Client { remote: SocketAddr },
}

/// Timing and size limits for a [`SequencedDatagramChannel`].
#[derive(Debug, Clone)]
pub struct DatagramConfig {
    /// How long a client waits for its sync echo. Default: 1 s.
    pub sync_timeout: Duration,
    /// Largest datagram sent or received, header included. Default: 1500.
    pub max_datagram: usize,
}

impl Default for DatagramConfig {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_millis(1000),
            max_datagram: DEFAULT_MAX_DATAGRAM,
        }
    }
}

/// Datagram channel that drops stale and duplicate datagrams.
///
/// Every datagram carries the sender's sequence number. A server accepts a
/// datagram only when its sequence is strictly greater than the last one it
/// accepted. A client accepts only datagrams from its remote whose sequence
/// equals its own counter, i.e. replies to its most recent request. There
/// is no retransmission: lost datagrams stay lost.
///
/// Clients must call [`begin`](Self::begin) to run the sync handshake, which
/// resets both ends to sequence 0. Calling it again re-synchronizes.
pub struct SequencedDatagramChannel<T: DatagramTransport = DatagramSocket> {
    transport: Option<T>,
    role: Role,
    peer: Option<SocketAddr>,
    sequence: i64,
    state: ChannelState,
    outbound: BytesMut,
    delivered: BytesMut,
    recv_buf: Vec<u8>,
    counters: Counters,
    config: DatagramConfig,
    clock: Arc<dyn Clock>,
}

impl SequencedDatagramChannel<DatagramSocket> {
    /// Bind a UDP server channel on `addr`.
    pub fn bind_server(
        addr: impl ToSocketAddrs + Display,
        config: DatagramConfig,
    ) -> Result<Self> {
        let socket = DatagramSocket::bind(addr)?;
        Ok(Self::server(socket, config))
    }

    /// Bind a UDP client channel on `local` that talks to `remote`.
    pub fn bind_client(
        local: impl ToSocketAddrs + Display,
        remote: SocketAddr,
        config: DatagramConfig,
    ) -> Result<Self> {
        let socket = DatagramSocket::bind(local)?;
        Ok(Self::client(socket, remote, config))
    }
}

impl<T: DatagramTransport> SequencedDatagramChannel<T> {
    /// Server channel over `transport`.
    pub fn server(transport: T, config: DatagramConfig) -> Self {
        Self::with_role(transport, Role::Server, config)
    }

    /// Client channel over `transport`, talking to `remote`.
    pub fn client(transport: T, remote: SocketAddr, config: DatagramConfig) -> Self {
        Self::with_role(transport, Role::Client { remote }, config)
    }

    fn with_role(transport: T, role: Role, config: DatagramConfig) -> Self {
        Self {
            transport: Some(transport),
            role,
            peer: match role {
                Role::Server => None,
                Role::Client { remote } => Some(remote),
            },
            sequence: 0,
            state: ChannelState::Unconnected,
            outbound: BytesMut::new(),
            delivered: BytesMut::new(),
            // One spare byte so an over-long datagram shows up as truncated.
            recv_buf: vec![0u8; config.max_datagram + 1],
            counters: Counters::default(),
            config,
            clock: Arc::new(SystemClock::default()),
        }
    }

    /// Measure timeouts with `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Reset the sequence to 0 and, for clients, run the sync handshake.
    ///
    /// A client sends `-1\r\r\n` to its remote and waits up to
    /// `sync_timeout` for the echo. On failure the channel is left
    /// unconnected and [`ChannelError::SyncFailed`] is returned.
    pub fn begin(&mut self) -> Result<()> {
        if self.transport.is_none() {
            return Err(ChannelError::Closed);
        }
        self.sequence = 0;
        self.outbound.clear();
        self.delivered.clear();

        let remote = match self.role {
            Role::Server => {
                self.state = ChannelState::Connected;
                info!(local = ?self.local_addr().ok(), "datagram server ready");
                return Ok(());
            }
            Role::Client { remote } => remote,
        };

        self.state = ChannelState::Syncing;
        debug!(%remote, "sending sync request");
        match self.sync_with(remote) {
            Ok(()) => {
                self.state = ChannelState::Connected;
                info!(%remote, "datagram channel synced");
                Ok(())
            }
            Err(err) => {
                self.state = ChannelState::Unconnected;
                debug!(%remote, error = %err, "sync failed");
                Err(err)
            }
        }
    }

    /// Queue payload bytes for the next [`flush`](Self::flush).
    ///
    /// Bytes that would push the datagram past `max_datagram` are rejected
    /// with [`FrameError::FrameTooLong`] and not queued.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        let size = MAX_SEQUENCE_DIGITS + SEQUENCE_MARKER.len() + self.outbound.len() + data.len();
        if size > self.config.max_datagram {
            return Err(FrameError::FrameTooLong {
                size,
                max: self.config.max_datagram,
            }
            .into());
        }
        self.outbound.extend_from_slice(data);
        Ok(data.len())
    }

    /// Send everything queued as one datagram. A no-op when nothing is queued.
    ///
    /// A client advances its sequence before sending; a server reuses the
    /// sequence of the request it is answering and sends to that request's
    /// source address.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.state != ChannelState::Connected {
            return Err(ChannelError::NotConnected);
        }
        if self.outbound.is_empty() {
            return Ok(());
        }

        let (sequence, target) = match self.role {
            Role::Client { remote } => {
                let next = self
                    .sequence
                    .checked_add(1)
                    .ok_or(ChannelError::SequenceExhausted)?;
                self.sequence = next;
                (next, remote)
            }
            Role::Server => (self.sequence, self.peer.ok_or(ChannelError::NoPeer)?),
        };

        let mut wire = BytesMut::with_capacity(MAX_SEQUENCE_DIGITS + self.outbound.len());
        encode_datagram(sequence, &self.outbound, &mut wire);
        self.transport_ref()?.send_to(&wire, target)?;
        self.counters.record_send();
        self.outbound.clear();
        trace!(sequence, %target, len = wire.len(), "datagram sent");
        Ok(())
    }

    /// Queue `payload` and flush it as one datagram.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.write(payload)?;
        self.flush()
    }

    /// Return the next accepted payload if one is waiting, without blocking.
    pub fn try_recv(&mut self) -> Result<Option<Bytes>> {
        if let Some(rest) = self.take_delivered() {
            return Ok(Some(rest));
        }
        self.poll(None)
    }

    /// Wait up to `timeout` for the next accepted payload.
    ///
    /// Dropped datagrams and sync requests do not end the wait early.
    /// Returns `Ok(None)` on timeout.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        if let Some(rest) = self.take_delivered() {
            return Ok(Some(rest));
        }
        let clock = Arc::clone(&self.clock);
        let wait = BoundedWait::new(clock.as_ref(), timeout);
        loop {
            if let Some(payload) = self.poll(wait.remaining())? {
                return Ok(Some(payload));
            }
            if wait.expired() {
                return Ok(None);
            }
        }
    }

    /// Release the socket. The channel cannot be used afterwards.
    pub fn stop(&mut self) {
        if self.transport.take().is_some() {
            debug!(
                sent = self.counters.sent,
                received = self.counters.received,
                dropped = self.counters.dropped,
                "datagram channel stopped"
            );
        }
        self.state = ChannelState::Closed;
        self.outbound.clear();
        self.delivered.clear();
    }

    /// Client: sequence of the last request sent. Server: sequence of the
    /// last datagram accepted.
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Where the next flush goes, if known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn config(&self) -> &DatagramConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport_ref()?.local_addr()?)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.transport.is_none() {
            return Err(ChannelError::Closed);
        }
        Ok(())
    }

    fn transport_ref(&self) -> Result<&T> {
        self.transport.as_ref().ok_or(ChannelError::Closed)
    }

    fn take_delivered(&mut self) -> Option<Bytes> {
        (!self.delivered.is_empty()).then(|| self.delivered.split().freeze())
    }

    fn sync_with(&mut self, remote: SocketAddr) -> Result<()> {
        self.transport_ref()?.send_to(SYNC_DATAGRAM, remote)?;

        let timeout = self.config.sync_timeout;
        let clock = Arc::clone(&self.clock);
        let wait = BoundedWait::new(clock.as_ref(), timeout);
        loop {
            match self.receive(wait.remaining())? {
                Some((dgram, from)) if dgram.is_sync() && from == remote => return Ok(()),
                Some((dgram, from)) => {
                    self.counters.record_drop();
                    trace!(sequence = dgram.sequence, %from, "dropping datagram while syncing");
                }
                None => {}
            }
            if wait.expired() {
                return Err(ChannelError::SyncFailed(timeout));
            }
        }
    }

    /// Receive and decode one datagram. Malformed and over-long datagrams
    /// count as drops.
    fn receive(&mut self, wait: Option<Duration>) -> Result<Option<(Datagram, SocketAddr)>> {
        let transport = self.transport.as_ref().ok_or(ChannelError::Closed)?;
        let Some((len, from)) = transport.recv_from(&mut self.recv_buf, wait)? else {
            return Ok(None);
        };
        if len > self.config.max_datagram {
            self.counters.record_drop();
            trace!(%from, max = self.config.max_datagram, "dropping over-long datagram");
            return Ok(None);
        }
        match decode_datagram(Bytes::copy_from_slice(&self.recv_buf[..len])) {
            Ok(dgram) => Ok(Some((dgram, from))),
            Err(err) => {
                self.counters.record_drop();
                trace!(%from, error = %err, "dropping malformed datagram");
                Ok(None)
            }
        }
    }

    /// One bounded receive, applying the role's acceptance rule.
    fn poll(&mut self, wait: Option<Duration>) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        if self.state != ChannelState::Connected {
            return Err(ChannelError::NotConnected);
        }
        let Some((dgram, from)) = self.receive(wait)? else {
            return Ok(None);
        };

        let accepted = match self.role {
            Role::Server if dgram.is_sync() => {
                self.sequence = 0;
                self.peer = Some(from);
                self.transport_ref()?.send_to(SYNC_DATAGRAM, from)?;
                debug!(%from, "sync request answered, sequence reset");
                return Ok(None);
            }
            Role::Server if dgram.sequence > self.sequence => {
                self.sequence = dgram.sequence;
                self.peer = Some(from);
                true
            }
            Role::Server => false,
            Role::Client { remote } => {
                from == remote && !dgram.is_sync() && dgram.sequence == self.sequence
            }
        };

        if !accepted {
            self.counters.record_drop();
            trace!(
                sequence = dgram.sequence,
                expected = self.sequence,
                %from,
                "dropping stale or foreign datagram"
            );
            return Ok(None);
        }

        self.counters.record_receive();
        trace!(sequence = dgram.sequence, %from, len = dgram.payload.len(), "datagram accepted");
        Ok(Some(dgram.payload))
    }
}

impl<T: DatagramTransport> ByteChannel for SequencedDatagramChannel<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.available()?;
        let n = buf.len().min(self.delivered.len());
        buf[..n].copy_from_slice(&self.delivered[..n]);
        self.delivered.advance(n);
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        SequencedDatagramChannel::write(self, data)
    }

    fn flush(&mut self) -> Result<()> {
        SequencedDatagramChannel::flush(self)
    }

    /// Polls the socket when nothing is buffered. Returns 0 while unconnected.
    fn available(&mut self) -> Result<usize> {
        self.ensure_open()?;
        if self.delivered.is_empty() && self.state == ChannelState::Connected {
            if let Some(payload) = self.poll(None)? {
                self.delivered.extend_from_slice(&payload);
            }
        }
        Ok(self.delivered.len())
    }

    fn connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    fn counters(&self) -> Counters {
        self.counters
    }
}

impl<T: DatagramTransport> std::fmt::Debug for SequencedDatagramChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequencedDatagramChannel")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("sequence", &self.sequence)
            .field("peer", &self.peer)
            .field("counters", &self.counters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;
    use std::thread;

    use super::*;
    use crate::clock::ManualClock;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// Scripted datagram transport; empty reads consume the whole wait.
    #[derive(Clone, Default)]
    struct Scripted {
        inbound: Arc<Mutex<VecDeque<(Vec<u8>, SocketAddr)>>>,
        sent: Arc<Mutex<Vec<(Vec<u8>, SocketAddr)>>>,
        clock: ManualClock,
    }

    impl Scripted {
        fn push(&self, raw: &[u8], from: SocketAddr) {
            self.inbound.lock().unwrap().push_back((raw.to_vec(), from));
        }

        fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl DatagramTransport for Scripted {
        fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
            self.sent.lock().unwrap().push((buf.to_vec(), target));
            Ok(buf.len())
        }

        fn recv_from(
            &self,
            buf: &mut [u8],
            wait: Option<Duration>,
        ) -> io::Result<Option<(usize, SocketAddr)>> {
            match self.inbound.lock().unwrap().pop_front() {
                Some((raw, from)) => {
                    let n = raw.len().min(buf.len());
                    buf[..n].copy_from_slice(&raw[..n]);
                    Ok(Some((n, from)))
                }
                None => {
                    self.clock.advance(wait.unwrap_or(Duration::ZERO));
                    Ok(None)
                }
            }
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(addr(9000))
        }
    }

    fn started_server(net: &Scripted) -> SequencedDatagramChannel<Scripted> {
        let mut channel =
            SequencedDatagramChannel::server(net.clone(), DatagramConfig::default())
                .with_clock(Arc::new(net.clock.clone()));
        channel.begin().expect("server begin should succeed");
        channel
    }

    fn synced_client(net: &Scripted, remote: SocketAddr) -> SequencedDatagramChannel<Scripted> {
        let mut channel =
            SequencedDatagramChannel::client(net.clone(), remote, DatagramConfig::default())
                .with_clock(Arc::new(net.clock.clone()));
        net.push(SYNC_DATAGRAM, remote);
        channel.begin().expect("client sync should succeed");
        channel
    }

    #[test]
    fn server_accepts_only_increasing_sequences() {
        let net = Scripted::default();
        let mut channel = started_server(&net);
        let client = addr(7000);

        net.push(b"5\r\rgo\n", client);
        let payload = channel.try_recv().expect("poll should succeed");
        assert_eq!(payload.as_deref(), Some(&b"go\n"[..]));
        assert_eq!(channel.sequence(), 5);

        net.push(b"3\r\rlate\n", client);
        net.push(b"5\r\rdup\n", client);
        assert!(channel.try_recv().expect("poll").is_none());
        assert!(channel.try_recv().expect("poll").is_none());
        assert_eq!(channel.sequence(), 5);
        assert_eq!(channel.counters().dropped, 2);
        assert_eq!(channel.counters().received, 1);
    }

    #[test]
    fn server_answers_sync_and_resets_sequence() {
        let net = Scripted::default();
        let mut channel = started_server(&net);
        let client = addr(7001);

        net.push(b"9\r\rold", client);
        channel.try_recv().expect("poll should succeed");
        assert_eq!(channel.sequence(), 9);

        net.push(SYNC_DATAGRAM, client);
        assert!(channel.try_recv().expect("poll").is_none());
        assert_eq!(channel.sequence(), 0);
        assert_eq!(net.sent(), vec![(SYNC_DATAGRAM.to_vec(), client)]);

        net.push(b"1\r\rfresh", client);
        let payload = channel.try_recv().expect("poll should succeed");
        assert_eq!(payload.as_deref(), Some(&b"fresh"[..]));
    }

    #[test]
    fn server_replies_with_current_sequence_to_last_sender() {
        let net = Scripted::default();
        let mut channel = started_server(&net);

        let err = channel.send(b"orphan").unwrap_err();
        assert!(matches!(err, ChannelError::NoPeer));

        net.push(b"4\r\rstatus\n", addr(7002));
        channel.try_recv().expect("poll should succeed");
        channel.send(b"ok\n").expect("reply should send");

        let sent = net.sent();
        assert_eq!(sent.last(), Some(&(b"4\r\rok\n".to_vec(), addr(7002))));
        assert_eq!(channel.sequence(), 4);
        assert_eq!(channel.counters().sent, 1);
    }

    #[test]
    fn client_sync_then_sequenced_requests() {
        let net = Scripted::default();
        let remote = addr(9100);
        let mut channel = synced_client(&net, remote);

        assert_eq!(channel.state(), ChannelState::Connected);
        assert_eq!(net.sent()[0], (SYNC_DATAGRAM.to_vec(), remote));

        channel.write(b"color ").expect("write should queue");
        channel.write(b"1 2 3\n").expect("write should queue");
        channel.flush().expect("flush should send");
        assert_eq!(net.sent()[1], (b"1\r\rcolor 1 2 3\n".to_vec(), remote));
        assert_eq!(channel.sequence(), 1);
    }

    #[test]
    fn client_accepts_only_its_current_sequence() {
        let net = Scripted::default();
        let remote = addr(9101);
        let mut channel = synced_client(&net, remote);
        for _ in 0..7 {
            channel.send(b"ping").expect("send should succeed");
        }
        assert_eq!(channel.sequence(), 7);

        net.push(b"8\r\rahead", remote);
        net.push(b"6\r\rbehind", remote);
        net.push(b"7\r\rforeign", addr(9999));
        for _ in 0..3 {
            assert!(channel.try_recv().expect("poll").is_none());
        }
        assert_eq!(channel.sequence(), 7);
        assert_eq!(channel.counters().dropped, 3);

        net.push(b"7\r\rpong", remote);
        let payload = channel.try_recv().expect("poll should succeed");
        assert_eq!(payload.as_deref(), Some(&b"pong"[..]));
    }

    #[test]
    fn client_sync_timeout_leaves_channel_unconnected() {
        let net = Scripted::default();
        let mut channel =
            SequencedDatagramChannel::client(net.clone(), addr(9102), DatagramConfig::default())
                .with_clock(Arc::new(net.clock.clone()));

        let err = channel.begin().unwrap_err();
        assert!(matches!(err, ChannelError::SyncFailed(_)));
        assert_eq!(channel.state(), ChannelState::Unconnected);
        assert!(!channel.connected());
        assert_eq!(net.clock.now(), Duration::from_millis(1000));

        let err = channel.send(b"x").unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected));
    }

    #[test]
    fn client_ignores_foreign_sync_echo() {
        let net = Scripted::default();
        let remote = addr(9103);
        let mut channel =
            SequencedDatagramChannel::client(net.clone(), remote, DatagramConfig::default())
                .with_clock(Arc::new(net.clock.clone()));

        net.push(SYNC_DATAGRAM, addr(1234));
        net.push(SYNC_DATAGRAM, remote);
        channel.begin().expect("sync from the remote should count");
        assert_eq!(channel.counters().dropped, 1);
    }

    #[test]
    fn begin_resyncs_and_resets_sequence() {
        let net = Scripted::default();
        let remote = addr(9104);
        let mut channel = synced_client(&net, remote);
        channel.send(b"a").expect("send should succeed");
        channel.send(b"b").expect("send should succeed");
        assert_eq!(channel.sequence(), 2);

        net.push(SYNC_DATAGRAM, remote);
        channel.begin().expect("resync should succeed");
        assert_eq!(channel.sequence(), 0);
    }

    #[test]
    fn malformed_datagrams_are_dropped() {
        let net = Scripted::default();
        let mut channel = started_server(&net);

        net.push(b"no marker here", addr(7003));
        net.push(b"x1\r\rbad", addr(7003));
        assert!(channel.try_recv().expect("poll").is_none());
        assert!(channel.try_recv().expect("poll").is_none());
        assert_eq!(channel.counters().dropped, 2);
    }

    #[test]
    fn recv_timeout_waits_on_clock() {
        let net = Scripted::default();
        let mut channel = started_server(&net);

        let got = channel
            .recv_timeout(Duration::from_millis(250))
            .expect("timed receive should succeed");
        assert!(got.is_none());
        assert_eq!(net.clock.now(), Duration::from_millis(250));
    }

    #[test]
    fn oversized_write_is_rejected() {
        let net = Scripted::default();
        let config = DatagramConfig {
            max_datagram: 32,
            ..DatagramConfig::default()
        };
        let mut channel = SequencedDatagramChannel::server(net, config);
        channel.write(b"0123456789").expect("small write fits");
        let err = channel.write(b"0123456789").unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Frame(FrameError::FrameTooLong { max: 32, .. })
        ));
    }

    #[test]
    fn client_sequence_exhaustion_is_an_error() {
        let net = Scripted::default();
        let mut channel = synced_client(&net, addr(9105));
        channel.sequence = i64::MAX;

        let err = channel.send(b"x").unwrap_err();
        assert!(matches!(err, ChannelError::SequenceExhausted));
        assert_eq!(channel.sequence(), i64::MAX);
    }

    #[test]
    fn stop_is_terminal() {
        let net = Scripted::default();
        let mut channel = started_server(&net);
        channel.stop();

        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(matches!(channel.begin().unwrap_err(), ChannelError::Closed));
        assert!(matches!(channel.try_recv().unwrap_err(), ChannelError::Closed));
        assert!(matches!(channel.write(b"x").unwrap_err(), ChannelError::Closed));
    }

    #[test]
    fn byte_reads_drain_accepted_payloads() {
        let net = Scripted::default();
        let mut channel = started_server(&net);
        net.push(b"1\r\rabc", addr(7004));

        let mut buf = [0u8; 2];
        assert_eq!(ByteChannel::read(&mut channel, &mut buf).expect("read"), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(channel.available().expect("available"), 1);
        assert_eq!(ByteChannel::read(&mut channel, &mut buf).expect("read"), 1);
        assert_eq!(buf[0], b'c');
    }

    #[test]
    fn over_long_datagram_is_dropped_whole() {
        let net = Scripted::default();
        let mut channel = SequencedDatagramChannel::server(
            net.clone(),
            DatagramConfig {
                max_datagram: 16,
                ..DatagramConfig::default()
            },
        )
        .with_clock(Arc::new(net.clock.clone()));
        channel.begin().expect("server begin should succeed");

        let mut raw = b"1\r\r".to_vec();
        raw.extend_from_slice(&[b'a'; 32]);
        net.push(&raw, addr(7005));
        assert!(channel.try_recv().expect("poll").is_none());
        assert_eq!(channel.counters().dropped, 1);
        assert_eq!(channel.sequence(), 0);

        // Exactly at the limit is still accepted.
        net.push(b"2\r\r0123456789ab", addr(7005));
        let payload = channel.try_recv().expect("poll should succeed");
        assert_eq!(payload.as_deref(), Some(&b"0123456789ab"[..]));
    }

    #[test]
    fn over_long_udp_datagram_is_not_delivered_truncated() {
        let mut server =
            SequencedDatagramChannel::bind_server("127.0.0.1:0", DatagramConfig::default())
                .expect("server should bind");
        server.begin().expect("server begin should succeed");
        let server_addr = server.local_addr().expect("server should have an address");

        let raw = std::net::UdpSocket::bind("127.0.0.1:0").expect("raw socket should bind");
        let mut oversized = b"1\r\r".to_vec();
        oversized.extend_from_slice(&[b'a'; 3000]);
        raw.send_to(&oversized, server_addr)
            .expect("oversized datagram should send");

        let got = server
            .recv_timeout(Duration::from_millis(300))
            .expect("server receive should succeed");
        assert!(got.is_none());
        assert_eq!(server.counters().dropped, 1);

        raw.send_to(b"2\r\rok", server_addr)
            .expect("datagram should send");
        let got = server
            .recv_timeout(Duration::from_secs(5))
            .expect("server receive should succeed")
            .expect("datagram should arrive");
        assert_eq!(got.as_ref(), b"ok");
    }

    #[test]
    fn sync_and_exchange_over_udp() {
        let mut server =
            SequencedDatagramChannel::bind_server("127.0.0.1:0", DatagramConfig::default())
                .expect("server should bind");
        server.begin().expect("server begin should succeed");
        let server_addr = server.local_addr().expect("server should have an address");

        let handle = thread::spawn(move || {
            let request = server
                .recv_timeout(Duration::from_secs(5))
                .expect("server receive should succeed")
                .expect("request should arrive");
            server.send(b"world\n").expect("reply should send");
            request
        });

        let mut client = SequencedDatagramChannel::bind_client(
            "127.0.0.1:0",
            server_addr,
            DatagramConfig {
                sync_timeout: Duration::from_secs(5),
                ..DatagramConfig::default()
            },
        )
        .expect("client should bind");
        client.begin().expect("client should sync");
        assert!(client.connected());

        client.send(b"hello\n").expect("request should send");
        let reply = client
            .recv_timeout(Duration::from_secs(5))
            .expect("client receive should succeed")
            .expect("reply should arrive");

        assert_eq!(reply.as_ref(), b"world\n");
        let request = handle.join().expect("server thread should finish");
        assert_eq!(request.as_ref(), b"hello\n");
    }
}
