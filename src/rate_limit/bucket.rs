use std::time::{Duration, Instant};

/// Classic token bucket: `capacity` tokens max, refilled continuously at
/// `refill_rate` tokens per second.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

/// Outcome of a single withdrawal attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Withdrawal {
    pub allowed: bool,
    /// Whole tokens left after the attempt.
    pub remaining: u32,
    /// Time until the next token becomes available (zero if one already is).
    pub reset_after: Duration,
}

impl TokenBucket {
    /// Starts full.
    pub fn new(capacity: u32, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_rate,
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Takes one token if available. An empty bucket is left as it was.
    pub fn try_withdraw(&mut self, now: Instant) -> Withdrawal {
        self.refill(now);

        let allowed = self.tokens >= 1.0;
        if allowed {
            self.tokens -= 1.0;
        }

        Withdrawal {
            allowed,
            remaining: self.tokens.floor() as u32,
            reset_after: self.time_to_next_token(),
        }
    }

    fn time_to_next_token(&self) -> Duration {
        if self.tokens >= 1.0 || !(self.refill_rate.is_finite() && self.refill_rate > 0.0) {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64((1.0 - self.tokens) / self.refill_rate).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unusable_rates_never_panic() {
        let start = Instant::now();
        for rate in [f64::NAN, f64::INFINITY, 0.0, -1.0, 1e-300] {
            let mut bucket = TokenBucket::new(1, rate, start);
            assert!(bucket.try_withdraw(start).allowed);
            let rejected = bucket.try_withdraw(start);
            assert!(!rejected.allowed, "rate {rate}");
        }
    }

    #[test]
    fn burst_then_reject() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(3, 1.0, start);

        for expected_remaining in [2, 1, 0] {
            let w = bucket.try_withdraw(start);
            assert!(w.allowed);
            assert_eq!(w.remaining, expected_remaining);
        }

        let rejected = bucket.try_withdraw(start);
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.reset_after, Duration::from_secs(1));
    }

    #[test]
    fn partial_refill_grants_whole_tokens_only() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2, 2.0, start);
        bucket.try_withdraw(start);
        bucket.try_withdraw(start);

        // Half a token after 250ms.
        let w = bucket.try_withdraw(start + Duration::from_millis(250));
        assert!(!w.allowed);
        assert_eq!(w.reset_after, Duration::from_millis(250));

        let w = bucket.try_withdraw(start + Duration::from_millis(500));
        assert!(w.allowed);
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2, 10.0, start);
        bucket.try_withdraw(start);

        let later = start + Duration::from_secs(60);
        assert_eq!(bucket.try_withdraw(later).remaining, 1);
        assert_eq!(bucket.capacity(), 2);
    }
}
