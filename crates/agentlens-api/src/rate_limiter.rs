//! Fixed-window ingestion rate limiter (spec §4.3), grounded on the
//! sharded `RwLock<HashMap<...>>` structure of
//! `vex-api::tenant_rate_limiter::TenantRateLimiter`, replacing its GCRA
//! (`governor`) counters with the plain fixed-window dual-counter scheme
//! the spec mandates: a 60s window with independent `perKey`/`perOrg`
//! budgets that must both have headroom for a batch to be admitted.

use agentlens_core::retention::PlanTier;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    started_at: Instant,
}

impl Window {
    fn fresh(now: Instant) -> Self {
        Self { count: 0, started_at: now }
    }

    fn seconds_remaining(&self, now: Instant, window: Duration) -> u64 {
        window.saturating_sub(now.duration_since(self.started_at)).as_secs() + 1
    }
}

/// A batch is refused if either the per-key or per-org counter would
/// exceed its quota; in that case neither counter is incremented.
pub struct IngestRateLimiter {
    window: Duration,
    key_windows: RwLock<HashMap<String, Window>>,
    org_windows: RwLock<HashMap<String, Window>>,
    key_overrides: RwLock<HashMap<String, u64>>,
}

impl Default for IngestRateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[derive(Debug)]
pub struct RateLimitRejected {
    pub retry_after_secs: u64,
}

impl IngestRateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            key_windows: RwLock::new(HashMap::new()),
            org_windows: RwLock::new(HashMap::new()),
            key_overrides: RwLock::new(HashMap::new()),
        }
    }

    /// An explicit per-key override supersedes the tier limit (spec §4.3).
    pub async fn set_key_override(&self, key_id: &str, per_minute: u64) {
        self.key_overrides.write().await.insert(key_id.to_string(), per_minute);
    }

    /// Attempts to admit `count` events for `(org_id, key_id)` under
    /// `tier`'s quota. Atomic across both counters: either both are
    /// incremented or neither is.
    pub async fn check(
        &self,
        org_id: &str,
        key_id: &str,
        tier: PlanTier,
        count: u64,
    ) -> Result<(), RateLimitRejected> {
        let quota = tier.rate_limit_quota();
        let per_key_limit = {
            let overrides = self.key_overrides.read().await;
            overrides.get(key_id).copied().unwrap_or(quota.per_key_per_min)
        };

        let now = Instant::now();
        let mut key_windows = self.key_windows.write().await;
        let mut org_windows = self.org_windows.write().await;

        let key_window = key_windows.entry(key_id.to_string()).or_insert_with(|| Window::fresh(now));
        if now.duration_since(key_window.started_at) >= self.window {
            *key_window = Window::fresh(now);
        }
        let org_window = org_windows.entry(org_id.to_string()).or_insert_with(|| Window::fresh(now));
        if now.duration_since(org_window.started_at) >= self.window {
            *org_window = Window::fresh(now);
        }

        if key_window.count + count > per_key_limit {
            return Err(RateLimitRejected {
                retry_after_secs: key_window.seconds_remaining(now, self.window),
            });
        }
        if org_window.count + count > quota.per_org_per_min {
            return Err(RateLimitRejected {
                retry_after_secs: org_window.seconds_remaining(now, self.window),
            });
        }

        key_window.count += count;
        org_window.count += count;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn free_tier_allows_exactly_one_hundred_single_event_batches() {
        let limiter = IngestRateLimiter::default();
        for _ in 0..100 {
            assert!(limiter.check("org_a", "key_a", PlanTier::Free, 1).await.is_ok());
        }
        let rejected = limiter.check("org_a", "key_a", PlanTier::Free, 1).await;
        assert!(rejected.is_err());
    }

    #[tokio::test]
    async fn rejected_batch_does_not_consume_quota() {
        let limiter = IngestRateLimiter::default();
        for _ in 0..100 {
            limiter.check("org_a", "key_a", PlanTier::Free, 1).await.unwrap();
        }
        let _ = limiter.check("org_a", "key_a", PlanTier::Free, 1).await;
        let _ = limiter.check("org_a", "key_a", PlanTier::Free, 1).await;
        assert!(limiter.check("org_a", "key_a", PlanTier::Free, 1).await.is_err());
    }

    #[tokio::test]
    async fn per_key_override_supersedes_tier_limit() {
        let limiter = IngestRateLimiter::default();
        limiter.set_key_override("key_a", 5).await;
        for _ in 0..5 {
            assert!(limiter.check("org_a", "key_a", PlanTier::Free, 1).await.is_ok());
        }
        assert!(limiter.check("org_a", "key_a", PlanTier::Free, 1).await.is_err());
    }

    #[tokio::test]
    async fn independent_keys_do_not_share_quota() {
        let limiter = IngestRateLimiter::default();
        for _ in 0..100 {
            limiter.check("org_a", "key_a", PlanTier::Free, 1).await.unwrap();
        }
        assert!(limiter.check("org_a", "key_b", PlanTier::Free, 1).await.is_ok());
    }
}
