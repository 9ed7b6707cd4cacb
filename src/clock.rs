//! Network clock.
//!
//! Timestamps on the wire come from this clock rather than the system clock
//! directly, so `TIMESET` and burst-time skew correction can shift it.

use chrono::Utc;

#[derive(Debug, Clone, Default)]
pub struct NetClock {
    offset: i64,
    frozen: Option<i64>,
}

impl NetClock {
    /// Clock following the system time.
    pub fn system() -> Self {
        Self::default()
    }

    /// Clock pinned to `at`, moved only by [`advance`](Self::advance). Used in tests.
    pub fn frozen(at: i64) -> Self {
        Self {
            offset: 0,
            frozen: Some(at),
        }
    }

    /// Current network time in Unix seconds.
    pub fn now(&self) -> i64 {
        self.frozen.unwrap_or_else(|| Utc::now().timestamp()) + self.offset
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Shift the clock by `delta` seconds, returning the previous offset.
    pub fn adjust(&mut self, delta: i64) -> i64 {
        let old = self.offset;
        self.offset += delta;
        old
    }

    /// Move a frozen clock forward. No effect on a system clock.
    pub fn advance(&mut self, secs: i64) {
        if let Some(at) = self.frozen.as_mut() {
            *at += secs;
        }
    }
}
