/// Per-identifier request throttling
///
/// Token bucket admission control keyed by an identifier string. The HTTP
/// pipeline uses the client address, since admission runs before any
/// credential is read.
///
/// # Algorithm
///
/// - Capacity is the burst size; a new bucket starts full
/// - Tokens refill continuously at `requests_per_minute / 60` per second
/// - Each admitted request consumes 1 token
/// - A request is denied if less than 1 token is available
///
/// # Concurrency
///
/// The bucket table sits behind an `RwLock`; lookups of existing keys only
/// take the read lock, so different keys never wait on each other beyond
/// that. Refill and debit for one key run under that bucket's own `Mutex`,
/// which makes check-and-decrement atomic per key.
///
/// # Eviction
///
/// [`RateLimiter::sweep`] drops buckets that have refilled to capacity. A
/// bucket that is merely close to full is kept. The sweep only bounds memory;
/// evicting a full bucket is indistinguishable from keeping it.
///
/// # Example
///
/// ```
/// use holidayapi_shared::rate_limit::{RateLimitConfig, RateLimiter};
///
/// let limiter = RateLimiter::new(RateLimitConfig {
///     requests_per_minute: 60,
///     burst: 3,
/// });
///
/// assert!(limiter.admit("203.0.113.7"));
/// assert!(limiter.admit("203.0.113.7"));
/// assert!(limiter.admit("203.0.113.7"));
/// assert!(!limiter.admit("203.0.113.7"));
///
/// // Other identifiers have their own budget
/// assert!(limiter.admit("198.51.100.1"));
/// ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Throttle configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Sustained rate
    pub requests_per_minute: u32,

    /// Bucket capacity
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst: 10,
        }
    }
}

/// Token bucket for one identifier
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, rate: f64, capacity: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Process-local token bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
    rate: f64,
    capacity: f64,
}

impl RateLimiter {
    /// Creates an empty limiter
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            rate: f64::from(config.requests_per_minute) / 60.0,
            capacity: f64::from(config.burst),
        }
    }

    /// Admits or denies one request for `identifier`
    ///
    /// Never fails; `false` means the caller should be rejected.
    pub fn admit(&self, identifier: &str) -> bool {
        self.admit_at(identifier, Instant::now())
    }

    pub(crate) fn admit_at(&self, identifier: &str, now: Instant) -> bool {
        let bucket = self.bucket(identifier, now);
        let mut bucket = bucket.lock().unwrap_or_else(|p| p.into_inner());

        bucket.refill(self.rate, self.capacity, now);
        let admitted = bucket.try_consume();

        if !admitted {
            tracing::debug!(identifier = %identifier, "Rate limit exceeded");
        }

        admitted
    }

    fn bucket(&self, identifier: &str, now: Instant) -> Arc<Mutex<TokenBucket>> {
        {
            let buckets = self.buckets.read().unwrap_or_else(|p| p.into_inner());
            if let Some(bucket) = buckets.get(identifier) {
                return Arc::clone(bucket);
            }
        }

        // Another request may have inserted it between the two locks
        let mut buckets = self.buckets.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(
            buckets
                .entry(identifier.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::full(self.capacity, now)))),
        )
    }

    /// Seconds until a denied caller can expect one token
    pub fn retry_after_secs(&self) -> u64 {
        if self.rate <= 0.0 {
            return 60;
        }
        (1.0 / self.rate).ceil() as u64
    }

    /// Number of tracked identifiers
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Evicts buckets that have refilled to capacity; returns how many
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.write().unwrap_or_else(|p| p.into_inner());
        let before = buckets.len();

        buckets.retain(|_, bucket| {
            let mut bucket = bucket.lock().unwrap_or_else(|p| p.into_inner());
            bucket.refill(self.rate, self.capacity, now);
            bucket.tokens < self.capacity
        });

        before - buckets.len()
    }

    /// Runs [`sweep`](Self::sweep) every `interval` until `shutdown` fires
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Rate limiter sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        if evicted > 0 {
                            tracing::debug!(
                                evicted,
                                remaining = limiter.bucket_count(),
                                "Evicted idle rate limit buckets"
                            );
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests_per_minute: u32, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            requests_per_minute,
            burst,
        })
    }

    #[test]
    fn test_burst_then_deny() {
        let limiter = limiter(60, 3);
        let now = Instant::now();

        assert!(limiter.admit_at("ip", now));
        assert!(limiter.admit_at("ip", now));
        assert!(limiter.admit_at("ip", now));
        assert!(!limiter.admit_at("ip", now));
        assert!(!limiter.admit_at("ip", now));
    }

    #[test]
    fn test_refill_restores_admission() {
        // 60 rpm = one token per second
        let limiter = limiter(60, 2);
        let start = Instant::now();

        assert!(limiter.admit_at("ip", start));
        assert!(limiter.admit_at("ip", start));
        assert!(!limiter.admit_at("ip", start));

        // Half a token is not enough
        assert!(!limiter.admit_at("ip", start + Duration::from_millis(500)));

        assert!(limiter.admit_at("ip", start + Duration::from_millis(1000)));
        assert!(!limiter.admit_at("ip", start + Duration::from_millis(1000)));
    }

    #[test]
    fn test_refill_is_capped_at_burst() {
        let limiter = limiter(60, 2);
        let start = Instant::now();

        assert!(limiter.admit_at("ip", start));

        let later = start + Duration::from_secs(3600);
        assert!(limiter.admit_at("ip", later));
        assert!(limiter.admit_at("ip", later));
        assert!(!limiter.admit_at("ip", later));
    }

    #[test]
    fn test_identifiers_are_independent() {
        let limiter = limiter(60, 1);
        let now = Instant::now();

        assert!(limiter.admit_at("a", now));
        assert!(!limiter.admit_at("a", now));
        assert!(limiter.admit_at("b", now));
        assert_eq!(limiter.bucket_count(), 2);
    }

    #[test]
    fn test_concurrent_admits_never_exceed_burst() {
        // 1 rpm: no meaningful refill while the threads run
        let limiter = limiter(1, 5);

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| (0..10).filter(|_| limiter.admit("shared")).count())
                })
                .collect();

            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(admitted, 5);
    }

    #[test]
    fn test_sweep_evicts_only_full_buckets() {
        let limiter = limiter(60, 3);
        let start = Instant::now();

        limiter.admit_at("idle", start);
        for _ in 0..3 {
            limiter.admit_at("busy", start + Duration::from_secs(10));
        }

        // "idle" has refilled to capacity by now, "busy" has not
        let evicted = limiter.sweep_at(start + Duration::from_secs(11));
        assert_eq!(evicted, 1);
        assert_eq!(limiter.bucket_count(), 1);

        // A recreated bucket starts full
        assert!(limiter.admit_at("idle", start + Duration::from_secs(11)));
    }

    #[test]
    fn test_retry_after() {
        assert_eq!(limiter(60, 1).retry_after_secs(), 1);
        assert_eq!(limiter(6, 1).retry_after_secs(), 10);
        assert_eq!(limiter(0, 1).retry_after_secs(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_cancelled() {
        let limiter = Arc::new(limiter(600, 1));

        // Spent long enough ago that it has refilled by the first sweep
        let past = Instant::now().checked_sub(Duration::from_secs(10)).unwrap();
        assert!(limiter.admit_at("client", past));
        assert_eq!(limiter.bucket_count(), 1);

        let shutdown = CancellationToken::new();
        let handle = limiter.spawn_sweeper(Duration::from_secs(300), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(limiter.bucket_count(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(limiter.bucket_count(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
