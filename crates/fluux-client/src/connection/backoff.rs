// fluux-core/fluux-client
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Exponential reconnect backoff: `min(cap, base · 2^(n−1)) + jitter`.
/// Reset to attempt 0 on every successful transition to live.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            max_jitter: Duration::from_millis(300),
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Backoff {
            base,
            cap,
            max_jitter: Duration::from_millis(300),
        }
    }

    /// The deterministic part of the delay for attempt `n` (1-based).
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.base.min(self.cap);
        }
        let exponent = (attempt - 1).min(16);
        let factor = 2u32.saturating_pow(exponent);
        self.base
            .saturating_mul(factor)
            .min(self.cap)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.raw_delay(attempt) + self.jitter()
    }

    /// Spreads simultaneous reconnects of many clients; sub-second and
    /// not security relevant, so the clock subseconds are enough.
    fn jitter(&self) -> Duration {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let max = self.max_jitter.as_millis().max(1) as u32;
        Duration::from_millis((nanos % max) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_until_cap() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60));

        assert_eq!(backoff.raw_delay(1), Duration::from_secs(1));
        assert_eq!(backoff.raw_delay(2), Duration::from_secs(2));
        assert_eq!(backoff.raw_delay(3), Duration::from_secs(4));
        assert_eq!(backoff.raw_delay(6), Duration::from_secs(32));
        assert_eq!(backoff.raw_delay(7), Duration::from_secs(60));
        assert_eq!(backoff.raw_delay(30), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_bounded() {
        let backoff = Backoff::default();
        for attempt in 1..5 {
            let delay = backoff.delay(attempt);
            let raw = backoff.raw_delay(attempt);
            assert!(delay >= raw);
            assert!(delay <= raw + Duration::from_millis(300));
        }
    }
}
