//! Inbound connection throttling.
//!
//! Each source address gets its own token bucket. A peer stuck in a
//! reconnect loop is refused before it costs a handshake.

use std::net::IpAddr;
use std::num::NonZeroU32;

use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use tracing::debug;

/// Connections allowed from one address before throttling starts.
const DEFAULT_BURST: NonZeroU32 = nonzero!(3u32);

#[derive(Debug)]
pub struct AcceptThrottle {
    limiters: DashMap<IpAddr, DefaultDirectRateLimiter>,
    quota: Quota,
}

impl AcceptThrottle {
    /// One connection per `period_secs`, after an initial burst.
    pub fn new(period_secs: u64, burst: NonZeroU32) -> Self {
        let period = std::time::Duration::from_secs(period_secs.max(1));
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(nonzero!(1u32)))
            .allow_burst(burst);
        Self {
            limiters: DashMap::new(),
            quota,
        }
    }

    /// Whether a new connection from `ip` may proceed.
    pub fn check(&self, ip: IpAddr) -> bool {
        let limiter = self
            .limiters
            .entry(ip)
            .or_insert_with(|| RateLimiter::direct(self.quota));
        let allowed = limiter.check().is_ok();
        if !allowed {
            debug!(ip = %ip, "inbound link throttled");
        }
        allowed
    }

    /// Number of addresses currently tracked.
    pub fn tracked(&self) -> usize {
        self.limiters.len()
    }

    pub fn clear(&self) {
        self.limiters.clear();
    }
}

impl Default for AcceptThrottle {
    fn default() -> Self {
        Self::new(10, DEFAULT_BURST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_refuse() {
        let throttle = AcceptThrottle::default();
        let ip: IpAddr = "192.0.2.1".parse().unwrap();
        for _ in 0..3 {
            assert!(throttle.check(ip));
        }
        assert!(!throttle.check(ip));
    }

    #[test]
    fn addresses_are_independent() {
        let throttle = AcceptThrottle::new(60, nonzero!(1u32));
        let a: IpAddr = "192.0.2.1".parse().unwrap();
        let b: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(throttle.check(a));
        assert!(!throttle.check(a));
        assert!(throttle.check(b));
        assert_eq!(throttle.tracked(), 2);
        throttle.clear();
        assert!(throttle.check(a));
    }
}
