//! The retention purge job (spec §4.6): for every active tenant, delete
//! events and audit-log rows older than that tenant's plan-tier cutoff.
//! No teacher equivalent exists; the per-tenant isolated-failure loop
//! follows the same "continue past one failure, report at the end"
//! shape the spec calls for, written in the store's own idiom.

use crate::backend::EventStore;
use agentlens_core::retention::{cutoff, PlanTier, RetentionPolicy};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct TenantPlan {
    pub tenant_id: String,
    pub tier: PlanTier,
    pub event_days_override: Option<i64>,
    pub audit_log_days_override: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct TenantPurgeOutcome {
    pub tenant_id: String,
    pub events_deleted: u64,
    pub audit_log_deleted: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PurgeSummary {
    pub tenants: Vec<TenantPurgeOutcome>,
}

impl PurgeSummary {
    pub fn failed_tenants(&self) -> impl Iterator<Item = &TenantPurgeOutcome> {
        self.tenants.iter().filter(|t| t.error.is_some())
    }
}

/// How many events fall inside the next `warning_days` before they'd be
/// purged, used to surface an `approaching_expiry` warning ahead of time.
pub async fn events_approaching_expiry(
    store: &Arc<dyn EventStore>,
    tenant_id: &str,
    policy: &RetentionPolicy,
    warning_days: i64,
) -> u64 {
    let now = chrono::Utc::now();
    let purge_cutoff = cutoff(now, policy.event_days);
    let warning_cutoff = purge_cutoff + chrono::Duration::days(warning_days);
    let filter = crate::types::EventFilter {
        from: Some(purge_cutoff),
        to: Some(warning_cutoff),
        limit: usize::MAX,
        ..crate::types::EventFilter::new()
    };
    store.count_events(tenant_id, &filter).await.unwrap_or(0)
}

/// Run one purge pass over every tenant in `plans`. A single tenant's
/// store failure is recorded in its outcome and never stops the loop
/// (spec §4.6 "the job MUST continue processing other tenants").
pub async fn run_purge(store: &Arc<dyn EventStore>, plans: &[TenantPlan]) -> PurgeSummary {
    let mut summary = PurgeSummary::default();
    for plan in plans {
        let policy = plan.tier.resolve(plan.event_days_override, plan.audit_log_days_override);
        let now = chrono::Utc::now();
        let event_cutoff = cutoff(now, policy.event_days);
        let audit_cutoff = cutoff(now, policy.audit_log_days);

        let mut outcome = TenantPurgeOutcome {
            tenant_id: plan.tenant_id.clone(),
            ..Default::default()
        };

        match store.apply_retention(&plan.tenant_id, event_cutoff).await {
            Ok(n) => outcome.events_deleted = n,
            Err(e) => {
                outcome.error = Some(format!("event purge failed: {e}"));
                summary.tenants.push(outcome);
                continue;
            }
        }

        match store.apply_audit_log_retention(&plan.tenant_id, audit_cutoff).await {
            Ok(n) => outcome.audit_log_deleted = n,
            Err(e) => outcome.error = Some(format!("audit log purge failed: {e}")),
        }

        summary.tenants.push(outcome);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use agentlens_core::event::{Event, EventType, OrderedObject, Severity};
    use agentlens_core::hash::HashInput;

    fn old_event(tenant: &str) -> Event {
        let ts = chrono::Utc::now() - chrono::Duration::days(40);
        let payload = OrderedObject::new();
        let metadata = OrderedObject::new();
        let hash = HashInput {
            id: "e1",
            timestamp: &ts,
            session_id: "s1",
            agent_id: "a1",
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload: &payload,
            metadata: &metadata,
            prev_hash: None,
        }
        .compute_hash();
        Event {
            id: "e1".into(),
            timestamp: ts,
            session_id: "s1".into(),
            agent_id: "a1".into(),
            tenant_id: tenant.into(),
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload,
            metadata,
            prev_hash: None,
            hash,
        }
    }

    #[tokio::test]
    async fn free_tier_purges_events_older_than_seven_days() {
        let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
        store.insert_events("t_a", vec![old_event("t_a")]).await.unwrap();

        let plans = vec![TenantPlan {
            tenant_id: "t_a".into(),
            tier: PlanTier::Free,
            event_days_override: None,
            audit_log_days_override: None,
        }];
        let summary = run_purge(&store, &plans).await;
        assert_eq!(summary.tenants[0].events_deleted, 1);
        assert!(store.get_session_timeline("t_a", "s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_tenant_failure_does_not_block_the_rest() {
        let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
        store.insert_events("t_a", vec![old_event("t_a")]).await.unwrap();

        let plans = vec![
            TenantPlan {
                tenant_id: "t_missing".into(),
                tier: PlanTier::Free,
                event_days_override: None,
                audit_log_days_override: None,
            },
            TenantPlan {
                tenant_id: "t_a".into(),
                tier: PlanTier::Free,
                event_days_override: None,
                audit_log_days_override: None,
            },
        ];
        let summary = run_purge(&store, &plans).await;
        assert_eq!(summary.tenants.len(), 2);
        assert_eq!(summary.tenants[1].events_deleted, 1);
    }
}
