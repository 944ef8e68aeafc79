//! The clock interface consumed from outside the core.
//!
//! Lock renewal scheduling and operation TTL bookkeeping are the only
//! places that need "now" independent of the store's own `_ts`; everywhere
//! else the server-assigned timestamp on the envelope is authoritative.
use chrono::{DateTime, Utc};

/// A source of the current time, injected so lock renewal and TTL math are
/// deterministic under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The production clock: wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Clock;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// A clock callers can advance deterministically, for lock-renewal and
    /// TTL-expiry tests.
    pub struct FixedClock {
        micros: AtomicI64,
    }

    impl FixedClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                micros: AtomicI64::new(start.timestamp_micros()),
            }
        }

        pub fn advance(&self, delta: chrono::Duration) {
            self.micros
                .fetch_add(delta.num_microseconds().unwrap_or(0), Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp_micros(self.micros.load(Ordering::SeqCst))
                .expect("fixed clock holds a valid timestamp")
        }
    }
}
