//! Retention tier policy table (spec §4.6), grounded on the
//! tier/quota lookup pattern in `vex-api::tenant_rate_limiter::RateLimitTier`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Team,
    Enterprise,
}

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub event_days: i64,
    pub audit_log_days: i64,
}

impl PlanTier {
    pub fn default_retention(&self) -> RetentionPolicy {
        match self {
            PlanTier::Free => RetentionPolicy {
                event_days: 7,
                audit_log_days: 30,
            },
            PlanTier::Pro => RetentionPolicy {
                event_days: 30,
                audit_log_days: 90,
            },
            PlanTier::Team => RetentionPolicy {
                event_days: 90,
                audit_log_days: 365,
            },
            PlanTier::Enterprise => RetentionPolicy {
                event_days: 365,
                audit_log_days: 365,
            },
        }
    }

    /// Only enterprise tenants may override the default (spec §4.6).
    pub fn resolve(&self, event_days_override: Option<i64>, audit_log_days_override: Option<i64>) -> RetentionPolicy {
        let default = self.default_retention();
        if *self != PlanTier::Enterprise {
            return default;
        }
        RetentionPolicy {
            event_days: event_days_override.unwrap_or(default.event_days),
            audit_log_days: audit_log_days_override
                .map(|d| d.max(default.audit_log_days))
                .unwrap_or(default.audit_log_days),
        }
    }

    /// Per-key/per-org rate-limit quotas (spec §4.3).
    pub fn rate_limit_quota(&self) -> RateLimitQuota {
        match self {
            PlanTier::Free => RateLimitQuota {
                per_key_per_min: 100,
                per_org_per_min: 200,
            },
            PlanTier::Pro => RateLimitQuota {
                per_key_per_min: 5_000,
                per_org_per_min: 10_000,
            },
            PlanTier::Team => RateLimitQuota {
                per_key_per_min: 50_000,
                per_org_per_min: 100_000,
            },
            PlanTier::Enterprise => RateLimitQuota {
                per_key_per_min: 50_000,
                per_org_per_min: 100_000,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitQuota {
    pub per_key_per_min: u64,
    pub per_org_per_min: u64,
}

/// Cutoff computation: `now - retentionDays`, truncated to UTC midnight.
pub fn cutoff(now: chrono::DateTime<chrono::Utc>, retention_days: i64) -> chrono::DateTime<chrono::Utc> {
    let d = now - chrono::Duration::days(retention_days);
    d.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn enterprise_override_floors_to_tier_default() {
        let policy = PlanTier::Enterprise.resolve(Some(400), Some(10));
        assert_eq!(policy.event_days, 400);
        assert_eq!(policy.audit_log_days, 365);
    }

    #[test]
    fn non_enterprise_ignores_override() {
        let policy = PlanTier::Free.resolve(Some(9999), Some(9999));
        assert_eq!(policy.event_days, 7);
        assert_eq!(policy.audit_log_days, 30);
    }

    #[test]
    fn cutoff_truncates_to_midnight() {
        let now = chrono::Utc.with_ymd_and_hms(2026, 3, 15, 13, 45, 0).unwrap();
        let c = cutoff(now, 7);
        assert_eq!(c.format("%H:%M:%S").to_string(), "00:00:00");
    }
}
