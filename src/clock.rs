//! Wall-clock access for stores.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;

    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_ms())
            .single()
            .unwrap_or_default()
    }

    /// ISO-8601 UTC timestamp with millisecond precision, e.g. `2024-01-01T08:00:00.000Z`.
    fn now_iso(&self) -> String {
        self.now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to. Handy for hosts replaying state and for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self { now: AtomicI64::new(now_ms) }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Hands out strictly increasing millisecond stamps.
///
/// Records are keyed by creation time, so two calls inside the same
/// millisecond get `t` and `t + 1` instead of colliding.
#[derive(Debug, Default, Clone)]
pub struct MonotonicMillis {
    last: i64,
}

impl MonotonicMillis {
    pub fn next(&mut self, now_ms: i64) -> i64 {
        let stamp = now_ms.max(self.last + 1);
        self.last = stamp;
        stamp
    }

    /// Makes sure future stamps sort after an already issued one.
    pub fn observe(&mut self, issued: i64) {
        self.last = self.last.max(issued);
    }

    pub fn reset(&mut self) {
        self.last = 0;
    }
}
