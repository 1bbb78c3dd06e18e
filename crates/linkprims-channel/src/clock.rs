use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source for channel timeouts.
///
/// Channels measure every timeout through a `Clock`, so tests can drive
/// timeouts with a [`ManualClock`] instead of sleeping.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall-clock time backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock that only moves when told to.
///
/// Clones share the same time, so a test can keep one handle and give
/// another to the channel under test.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        let step = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .nanos
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(step))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// A deadline measured against a [`Clock`].
///
/// Used for every bounded wait in this crate: the ack wait, the sync wait and
/// timed receives. Each socket read is given [`BoundedWait::remaining`] as
/// its own wait, so the total never exceeds the timeout.
pub struct BoundedWait<'a> {
    clock: &'a dyn Clock,
    deadline: Duration,
    timeout: Duration,
}

impl<'a> BoundedWait<'a> {
    /// Start waiting `timeout` from the clock's current time.
    pub fn new(clock: &'a dyn Clock, timeout: Duration) -> Self {
        Self {
            clock,
            deadline: clock.now().saturating_add(timeout),
            timeout,
        }
    }

    /// Time left before the deadline, or `None` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        let left = self.deadline.saturating_sub(self.clock.now());
        (!left.is_zero()).then_some(left)
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        self.remaining().is_none()
    }

    /// The timeout this wait was started with.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
