//! Fixed-window request counters keyed by client identity.
//!
//! A [`RateLimiter`] applies one [`RatePolicy`] on top of a [`CounterStore`].
//! Counting happens in the store as a single atomic increment-and-read, so two
//! concurrent requests can never both observe the last free slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::RatePolicyConfig;
use crate::db::Store;
pub use crate::db::repositories::rate_limits::CounterRow;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit store error: {0}")]
    Store(String),
}

impl From<anyhow::Error> for RateLimitError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err.to_string())
    }
}

/// Outcome of one counted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

impl Decision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RatePolicy {
    /// Namespaces the counter keys, e.g. `login` or `chat`.
    pub name: &'static str,
    pub max_requests: u32,
    pub window: Duration,
}

impl RatePolicy {
    #[must_use]
    pub const fn from_config(name: &'static str, config: &RatePolicyConfig) -> Self {
        Self {
            name,
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_seconds),
        }
    }

    fn window_secs(&self) -> i64 {
        i64::try_from(self.window.as_secs()).unwrap_or(i64::MAX)
    }
}

/// Storage for rate limit counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increments the counter for `key` and returns its new state. When the
    /// stored window has elapsed at `now`, the window restarts at `now` with a
    /// count of one. Increment and read must be a single atomic step.
    async fn hit(&self, key: &str, now: i64, window_secs: i64)
    -> Result<CounterRow, RateLimitError>;

    async fn reset(&self, key: &str) -> Result<(), RateLimitError>;

    /// Drops counters under `prefix` whose window opened before `cutoff`.
    async fn purge_before(&self, prefix: &str, cutoff: i64) -> Result<u64, RateLimitError>;
}

/// In-process counters. State is lost on restart.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, CounterRow>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn hit(
        &self,
        key: &str,
        now: i64,
        window_secs: i64,
    ) -> Result<CounterRow, RateLimitError> {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);

        let row = counters.entry(key.to_string()).or_insert(CounterRow {
            count: 0,
            window_start: now,
        });

        if row.window_start.saturating_add(window_secs) <= now {
            row.count = 0;
            row.window_start = now;
        }
        row.count += 1;

        Ok(*row)
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    async fn purge_before(&self, prefix: &str, cutoff: i64) -> Result<u64, RateLimitError> {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let before = counters.len();
        counters.retain(|key, row| !key.starts_with(prefix) || row.window_start >= cutoff);
        Ok((before - counters.len()) as u64)
    }
}

/// Counters persisted in the `rate_limit_counters` table.
pub struct DatabaseCounterStore {
    store: Store,
}

impl DatabaseCounterStore {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CounterStore for DatabaseCounterStore {
    async fn hit(
        &self,
        key: &str,
        now: i64,
        window_secs: i64,
    ) -> Result<CounterRow, RateLimitError> {
        Ok(self.store.rate_limits().hit(key, now, window_secs).await?)
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        Ok(self.store.rate_limits().reset(key).await?)
    }

    async fn purge_before(&self, prefix: &str, cutoff: i64) -> Result<u64, RateLimitError> {
        Ok(self.store.rate_limits().purge_before(prefix, cutoff).await?)
    }
}

pub struct RateLimiter {
    policy: RatePolicy,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(policy: RatePolicy, store: Arc<dyn CounterStore>) -> Self {
        Self { policy, store }
    }

    #[must_use]
    pub const fn policy(&self) -> &RatePolicy {
        &self.policy
    }

    /// Counts one request for `key` and decides whether it may proceed.
    pub async fn check_and_record(&self, key: &str) -> Result<Decision, RateLimitError> {
        self.check_and_record_at(key, Utc::now()).await
    }

    pub async fn check_and_record_at(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision, RateLimitError> {
        let now = now.timestamp();
        let window = self.policy.window_secs();
        let row = self.store.hit(&self.scoped(key), now, window).await?;

        let max = i64::from(self.policy.max_requests);
        if row.count <= max {
            let remaining = u32::try_from(max - row.count).unwrap_or(0);
            return Ok(Decision::Allowed { remaining });
        }

        let retry_after = (row.window_start.saturating_add(window) - now).max(1);
        metrics::counter!("rate_limit_rejections_total", "policy" => self.policy.name)
            .increment(1);
        tracing::debug!(policy = self.policy.name, key, "Rate limit exceeded");

        Ok(Decision::Limited {
            retry_after_secs: u64::try_from(retry_after).unwrap_or(1),
        })
    }

    /// Forgets all hits for `key`, e.g. after a successful login.
    pub async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.store.reset(&self.scoped(key)).await
    }

    /// Drops counters whose window has fully elapsed.
    pub async fn purge_expired(&self) -> Result<u64, RateLimitError> {
        self.purge_expired_at(Utc::now()).await
    }

    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<u64, RateLimitError> {
        let cutoff = now.timestamp().saturating_sub(self.policy.window_secs());
        let prefix = format!("{}:", self.policy.name);
        self.store.purge_before(&prefix, cutoff).await
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}:{key}", self.policy.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy(max_requests: u32, window_secs: u64) -> RatePolicy {
        RatePolicy {
            name: "test",
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_exactly_max_requests_pass_per_window() {
        let limiter = RateLimiter::new(policy(5, 900), Arc::new(MemoryCounterStore::new()));

        for i in 0..5 {
            let decision = limiter.check_and_record_at("1.2.3.4", at(i)).await.unwrap();
            assert!(decision.is_allowed(), "request {i} should pass");
        }

        let sixth = limiter.check_and_record_at("1.2.3.4", at(10)).await.unwrap();
        assert_eq!(
            sixth,
            Decision::Limited {
                retry_after_secs: 890
            }
        );
    }

    #[tokio::test]
    async fn test_window_rollover_restarts_count() {
        let limiter = RateLimiter::new(policy(2, 60), Arc::new(MemoryCounterStore::new()));

        assert!(limiter.check_and_record_at("k", at(0)).await.unwrap().is_allowed());
        assert!(limiter.check_and_record_at("k", at(1)).await.unwrap().is_allowed());
        assert!(!limiter.check_and_record_at("k", at(2)).await.unwrap().is_allowed());

        let after = limiter.check_and_record_at("k", at(60)).await.unwrap();
        assert_eq!(after, Decision::Allowed { remaining: 1 });
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(policy(1, 60), Arc::new(MemoryCounterStore::new()));

        assert!(limiter.check_and_record_at("a", at(0)).await.unwrap().is_allowed());
        assert!(limiter.check_and_record_at("b", at(0)).await.unwrap().is_allowed());
        assert!(!limiter.check_and_record_at("a", at(1)).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_reset_clears_key() {
        let limiter = RateLimiter::new(policy(1, 60), Arc::new(MemoryCounterStore::new()));

        assert!(limiter.check_and_record_at("a", at(0)).await.unwrap().is_allowed());
        limiter.reset("a").await.unwrap();
        assert!(limiter.check_and_record_at("a", at(1)).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_concurrent_hits_do_not_overshoot() {
        let limiter = Arc::new(RateLimiter::new(
            policy(5, 900),
            Arc::new(MemoryCounterStore::new()),
        ));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check_and_record_at("ip", at(0)).await })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }

    #[tokio::test]
    async fn test_database_store_counts_atomically() {
        let store = Store::new("sqlite::memory:").await.unwrap();
        let limiter = RateLimiter::new(
            policy(3, 60),
            Arc::new(DatabaseCounterStore::new(store.clone())),
        );

        for i in 0..3 {
            assert!(limiter.check_and_record_at("ip", at(i)).await.unwrap().is_allowed());
        }
        assert!(!limiter.check_and_record_at("ip", at(5)).await.unwrap().is_allowed());

        // Window rolls over after 60 seconds.
        assert_eq!(
            limiter.check_and_record_at("ip", at(61)).await.unwrap(),
            Decision::Allowed { remaining: 2 }
        );

        assert_eq!(limiter.purge_expired_at(at(200)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_only_touches_own_policy() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
        let chat = RateLimiter::new(policy(20, 60), Arc::clone(&store));
        let login = RateLimiter::new(
            RatePolicy {
                name: "login",
                max_requests: 5,
                window: Duration::from_secs(900),
            },
            Arc::clone(&store),
        );

        chat.check_and_record_at("ip", at(0)).await.unwrap();
        login.check_and_record_at("ip", at(0)).await.unwrap();

        assert_eq!(chat.purge_expired_at(at(120)).await.unwrap(), 1);
        assert_eq!(login.purge_expired_at(at(120)).await.unwrap(), 0);
    }
}
