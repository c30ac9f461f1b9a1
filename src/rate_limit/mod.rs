//! Per-visitor rate limiting.
//!
//! Every client key (normally an IP address) owns an independent
//! [`TokenBucket`]. The key map sits behind an `RwLock`: lookups of known
//! keys share the read lock, while inserts and the periodic purge take the
//! write lock. Each bucket has its own `Mutex`, so withdrawals on different
//! keys never contend with each other.

mod bucket;
pub mod middleware;

use bucket::TokenBucket;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_RATE_PER_SECOND: f64 = 5.0;
pub const DEFAULT_BURST: u32 = 10;
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);
const MIN_PURGE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitSettings {
    pub per_second: f64,
    pub burst: u32,
    pub purge_interval: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_second: DEFAULT_RATE_PER_SECOND,
            burst: DEFAULT_BURST,
            purge_interval: DEFAULT_PURGE_INTERVAL,
        }
    }
}

/// Result of [`VisitorLimiter::check`], used to fill the rate-limit headers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

#[derive(Debug)]
pub struct VisitorLimiter {
    settings: RateLimitSettings,
    visitors: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
}

impl VisitorLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            visitors: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> RateLimitSettings {
        self.settings
    }

    pub fn allow(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    pub(crate) fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let bucket = self.bucket_for(key, now);
        let withdrawal = bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_withdraw(now);

        RateDecision {
            allowed: withdrawal.allowed,
            limit: self.settings.burst,
            remaining: withdrawal.remaining,
            reset_after: withdrawal.reset_after,
        }
    }

    fn bucket_for(&self, key: &str, now: Instant) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self
            .visitors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(bucket);
        }

        let mut visitors = self.visitors.write().unwrap_or_else(PoisonError::into_inner);
        // Another request may have inserted the key between the two locks.
        Arc::clone(visitors.entry(key.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(TokenBucket::new(
                self.settings.burst,
                self.settings.per_second,
                now,
            )))
        }))
    }

    pub fn visitor_count(&self) -> usize {
        self.visitors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drops every bucket. Returning visitors start again with a full burst.
    pub fn purge(&self) -> usize {
        let mut visitors = self.visitors.write().unwrap_or_else(PoisonError::into_inner);
        let evicted = visitors.len();
        visitors.clear();
        evicted
    }

    /// Spawns the periodic purge. The caller aborts the handle on shutdown.
    pub fn spawn_purge_task(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        // `interval` panics on a zero period.
        let period = self.settings.purge_interval.max(MIN_PURGE_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = limiter.purge();
                debug!(evicted, "purged rate limiter visitors");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_second: f64, burst: u32) -> VisitorLimiter {
        VisitorLimiter::new(RateLimitSettings {
            per_second,
            burst,
            purge_interval: Duration::from_secs(60),
        })
    }

    #[test]
    fn requests_beyond_burst_are_rejected_until_refill() {
        let limiter = limiter(5.0, 10);
        let start = Instant::now();

        let allowed = (0..15)
            .filter(|_| limiter.check_at("10.0.0.1", start).allowed)
            .count();
        assert_eq!(allowed, 10);

        // Two seconds at 5/s refills the full burst of 10.
        let later = start + Duration::from_secs(2);
        let allowed = (0..15)
            .filter(|_| limiter.check_at("10.0.0.1", later).allowed)
            .count();
        assert_eq!(allowed, 10);
    }

    #[test]
    fn keys_have_independent_buckets() {
        let limiter = limiter(1.0, 1);
        let now = Instant::now();

        assert!(limiter.check_at("a", now).allowed);
        assert!(!limiter.check_at("a", now).allowed);
        assert!(limiter.check_at("b", now).allowed);
        assert_eq!(limiter.visitor_count(), 2);
    }

    #[test]
    fn rejection_reports_limit_and_reset() {
        let limiter = limiter(1.0, 2);
        let now = Instant::now();
        limiter.check_at("k", now);
        limiter.check_at("k", now);

        let decision = limiter.check_at("k", now);
        assert_eq!(
            decision,
            RateDecision {
                allowed: false,
                limit: 2,
                remaining: 0,
                reset_after: Duration::from_secs(1),
            }
        );
    }

    #[test]
    fn purge_restores_full_burst() {
        let limiter = limiter(0.001, 1);
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));

        assert_eq!(limiter.purge(), 1);
        assert_eq!(limiter.visitor_count(), 0);
        assert!(limiter.allow("k"));
    }

    #[test]
    fn concurrent_access_never_over_grants() {
        let limiter = Arc::new(limiter(0.001, 50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..20).filter(|_| limiter.allow("shared")).count())
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_task_clears_map_every_interval() {
        let limiter = Arc::new(limiter(1.0, 1));
        limiter.allow("k");
        let handle = limiter.spawn_purge_task();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(limiter.visitor_count(), 0);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_purge_interval_still_purges() {
        let limiter = Arc::new(VisitorLimiter::new(RateLimitSettings {
            purge_interval: Duration::ZERO,
            ..RateLimitSettings::default()
        }));
        limiter.allow("k");
        let handle = limiter.spawn_purge_task();

        tokio::time::sleep(MIN_PURGE_INTERVAL * 2).await;
        assert!(!handle.is_finished());
        assert_eq!(limiter.visitor_count(), 0);

        handle.abort();
    }
}
