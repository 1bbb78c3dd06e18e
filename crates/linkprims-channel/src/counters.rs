/// Per-channel message counts, kept for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Frames or datagrams transmitted, acks included.
    pub sent: u64,
    /// Frames or datagrams accepted, acks included.
    pub received: u64,
    /// Inbound datagrams rejected as stale, duplicate, foreign or malformed.
    pub dropped: u64,
}

impl Counters {
    pub(crate) fn record_send(&mut self) {
        self.sent = self.sent.saturating_add(1);
    }

    pub(crate) fn record_receive(&mut self) {
        self.received = self.received.saturating_add(1);
    }

    pub(crate) fn record_drop(&mut self) {
        self.dropped = self.dropped.saturating_add(1);
    }
}
