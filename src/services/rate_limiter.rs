//! Rate limiting for stats API calls.
//!
//! A token bucket every request consumes from, optional buckets for endpoint
//! path prefixes, and a global cool-down that backpressure responses extend.
//! All state lives behind the limiter's own locks so it can be shared by
//! every concurrent caller and reloaded in place.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::config::RateLimitConfig;

/// Token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(per_second: f64, burst: u32) -> Self {
        let max_tokens = f64::from(burst.max(1));
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate: per_second,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate)
        }
    }
}

#[derive(Debug)]
struct BucketSet {
    default: TokenBucket,
    prefixed: Vec<(String, TokenBucket)>,
}

impl BucketSet {
    fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            default: TokenBucket::new(config.per_second, config.burst),
            prefixed: config
                .prefixes
                .iter()
                .map(|p| (p.prefix.clone(), TokenBucket::new(p.per_second, p.burst)))
                .collect(),
        }
    }

    /// Index of the longest configured prefix matching `path`.
    fn prefix_bucket(&self, path: &str) -> Option<usize> {
        self.prefixed
            .iter()
            .enumerate()
            .filter(|(_, (prefix, _))| path.starts_with(prefix.as_str()))
            .max_by_key(|(_, (prefix, _))| prefix.len())
            .map(|(idx, _)| idx)
    }

    /// Take one token from every bucket that applies, or report how long to wait.
    fn try_acquire(&mut self, path: &str) -> Result<(), Duration> {
        let idx = self.prefix_bucket(path);

        let mut wait = self.default.time_until_available();
        if let Some(i) = idx {
            wait = wait.max(self.prefixed[i].1.time_until_available());
        }
        if !wait.is_zero() {
            return Err(wait);
        }

        self.default.tokens -= 1.0;
        if let Some(i) = idx {
            self.prefixed[i].1.tokens -= 1.0;
        }
        Ok(())
    }
}

/// Shared limiter for all outbound stats API calls.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<BucketSet>,
    cooldown_until: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(BucketSet::from_config(config)),
            cooldown_until: Mutex::new(None),
        }
    }

    /// Wait out any cool-down, then take a token for `path`.
    ///
    /// Returns the total time waited. Cancel-safe: no lock is held across a
    /// sleep, and tokens are only taken once every applicable bucket has one
    /// and no cool-down is pending.
    pub async fn acquire(&self, path: &str) -> Duration {
        let mut total_wait = Duration::ZERO;

        loop {
            // A cool-down can start while we sleep on a bucket, so check it every round.
            total_wait += self.wait_for_cooldown().await;

            let wait = {
                let mut buckets = self.buckets.lock().await;
                if self.cooldown_remaining().await > Duration::ZERO {
                    continue;
                }
                match buckets.try_acquire(path) {
                    Ok(()) => return total_wait,
                    Err(wait) => wait,
                }
            };

            trace!(path = %path, wait = ?wait, "rate limited");
            tokio::time::sleep(wait).await;
            total_wait += wait;
        }
    }

    /// Sleep until the global cool-down deadline, if one is in the future.
    pub async fn wait_for_cooldown(&self) -> Duration {
        let mut total_wait = Duration::ZERO;
        loop {
            let deadline = *self.cooldown_until.lock().await;
            match deadline {
                Some(until) if until > Instant::now() => {
                    let wait = until - Instant::now();
                    debug!(wait = ?wait, "waiting for stats API cool-down");
                    tokio::time::sleep_until(until).await;
                    total_wait += wait;
                }
                _ => return total_wait,
            }
        }
    }

    /// Push the cool-down deadline to at least `now + duration`. Never shortens it.
    pub async fn extend_cooldown(&self, duration: Duration) {
        let candidate = Instant::now() + duration;
        let mut until = self.cooldown_until.lock().await;
        match *until {
            Some(current) if current >= candidate => {}
            _ => *until = Some(candidate),
        }
    }

    /// Time left until the cool-down deadline.
    pub async fn cooldown_remaining(&self) -> Duration {
        match *self.cooldown_until.lock().await {
            Some(until) => until.saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    /// Replace every bucket with fresh ones built from `config`.
    ///
    /// The cool-down deadline is kept.
    pub async fn reload(&self, config: &RateLimitConfig) {
        let fresh = BucketSet::from_config(config);
        *self.buckets.lock().await = fresh;
        info!(
            per_second = config.per_second,
            burst = config.burst,
            prefixes = config.prefixes.len(),
            "Rate limiter buckets reloaded"
        );
    }

    /// Tokens left in the bucket set that applies to `path` (the smaller of the two).
    #[cfg(test)]
    pub async fn available_tokens(&self, path: &str) -> f64 {
        let mut buckets = self.buckets.lock().await;
        buckets.default.refill();
        let mut available = buckets.default.tokens;
        if let Some(i) = buckets.prefix_bucket(path) {
            buckets.prefixed[i].1.refill();
            available = available.min(buckets.prefixed[i].1.tokens);
        }
        available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrefixLimit;
    use std::sync::Arc;

    fn config(per_second: f64, burst: u32, prefixes: Vec<(&str, f64, u32)>) -> RateLimitConfig {
        RateLimitConfig {
            per_second,
            burst,
            prefixes: prefixes
                .into_iter()
                .map(|(prefix, per_second, burst)| PrefixLimit {
                    prefix: prefix.to_string(),
                    per_second,
                    burst,
                })
                .collect(),
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let set = BucketSet::from_config(&config(
            10.0,
            10,
            vec![("/lol", 1.0, 1), ("/lol/match/v5", 1.0, 1)],
        ));
        assert_eq!(set.prefix_bucket("/lol/match/v5/matches/NA1_1"), Some(1));
        assert_eq!(set.prefix_bucket("/lol/spectator/v5/x"), Some(0));
        assert_eq!(set.prefix_bucket("/riot/account"), None);
    }

    #[test]
    fn request_consumes_from_default_and_prefix_bucket() {
        let mut set = BucketSet::from_config(&config(0.001, 5, vec![("/lol/match", 0.001, 2)]));

        assert!(set.try_acquire("/lol/match/v5/1").is_ok());
        assert!(set.try_acquire("/lol/match/v5/2").is_ok());
        // Prefix bucket exhausted even though the default still has tokens.
        assert!(set.try_acquire("/lol/match/v5/3").is_err());
        assert!(set.try_acquire("/lol/spectator/v5/1").is_ok());
        assert!(set.default.tokens < 3.0);
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        let limiter = RateLimiter::new(&config(50.0, 1, vec![]));
        assert_eq!(limiter.acquire("/a").await, Duration::ZERO);

        let waited = limiter.acquire("/a").await;
        assert!(waited > Duration::ZERO);
        assert!(waited <= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn cooldown_only_grows() {
        let limiter = RateLimiter::new(&RateLimitConfig::default());
        assert_eq!(limiter.cooldown_remaining().await, Duration::ZERO);

        limiter.extend_cooldown(Duration::from_secs(30)).await;
        limiter.extend_cooldown(Duration::from_secs(1)).await;
        assert!(limiter.cooldown_remaining().await > Duration::from_secs(20));
    }

    #[tokio::test]
    async fn acquire_honors_cooldown() {
        let limiter = RateLimiter::new(&RateLimitConfig::default());
        limiter.extend_cooldown(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        limiter.acquire("/lol/spectator/v5").await;
        assert!(started.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn cooldown_set_while_waiting_on_bucket_is_honored() {
        let limiter = Arc::new(RateLimiter::new(&config(2.0, 1, vec![])));
        limiter.acquire("/x").await;

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire("/x").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        limiter.extend_cooldown(Duration::from_millis(800)).await;
        let cooldown_started = std::time::Instant::now();

        waiter.await.unwrap();
        assert!(cooldown_started.elapsed() >= Duration::from_millis(750));
        assert_eq!(limiter.cooldown_remaining().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn reload_replaces_buckets() {
        let limiter = RateLimiter::new(&config(0.001, 1, vec![]));
        limiter.acquire("/a").await;
        assert!(limiter.available_tokens("/a").await < 1.0);

        limiter
            .reload(&config(0.001, 3, vec![("/lol/match", 0.001, 1)]))
            .await;
        assert!(limiter.available_tokens("/a").await >= 3.0 - f64::EPSILON);
        assert!(limiter.available_tokens("/lol/match/v5").await <= 1.0);
    }

    #[tokio::test]
    async fn concurrent_acquires_complete() {
        let limiter = Arc::new(RateLimiter::new(&config(100.0, 5, vec![])));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.acquire("/x").await })
            })
            .collect();

        let result =
            tokio::time::timeout(Duration::from_secs(2), futures::future::join_all(handles)).await;
        assert!(result.is_ok(), "concurrent acquires should not deadlock");
    }
}
