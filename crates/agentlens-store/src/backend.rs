//! The tenant-aware event store contract (spec §4.2), grounded on the
//! shape of `vex-persist::backend::StorageBackend` but generalized from a
//! flat KV map to the richer relational/indexed contract the spec
//! requires: typed filters, derived aggregates, and per-entity CRUD.

use crate::error::StoreResult;
use crate::types::{
    AlertHistory, AlertRule, AnalyticsBucket, AnalyticsQuery, ConfigEntry, EventCounts,
    EventFilter, SessionFilter, TenantStats,
};
use agentlens_core::event::Event;
use agentlens_core::session::{Agent, Session};
use async_trait::async_trait;

/// Minimum operations any concrete backend must provide. Every method
/// takes `tenant_id` explicitly — concrete backends MUST refuse to
/// return or mutate rows whose `tenant_id` does not match (spec I4, P3).
#[async_trait]
pub trait EventStore: Send + Sync {
    fn name(&self) -> &str;

    /// Atomic: either every row in `events` is durable and every derived
    /// session/agent aggregate is updated, or none are (spec §4.2, P4).
    /// Callers must have already assigned `id`/`hash`/`prevHash`.
    async fn insert_events(&self, tenant_id: &str, events: Vec<Event>) -> StoreResult<()>;

    async fn get_event(&self, tenant_id: &str, id: &str) -> StoreResult<Option<Event>>;

    /// Returns `(page, total_matching)`.
    async fn query_events(&self, tenant_id: &str, filter: &EventFilter) -> StoreResult<(Vec<Event>, u64)>;

    async fn get_session_timeline(&self, tenant_id: &str, session_id: &str) -> StoreResult<Vec<Event>>;

    async fn get_last_event_hash(&self, tenant_id: &str, session_id: &str) -> StoreResult<Option<String>>;

    async fn count_events(&self, tenant_id: &str, filter: &EventFilter) -> StoreResult<u64>;

    async fn count_events_batch(&self, tenant_id: &str, filter: &EventFilter) -> StoreResult<EventCounts>;

    async fn upsert_session(&self, session: Session) -> StoreResult<()>;

    async fn query_sessions(&self, tenant_id: &str, filter: &SessionFilter) -> StoreResult<(Vec<Session>, u64)>;

    async fn get_session(&self, tenant_id: &str, id: &str) -> StoreResult<Option<Session>>;

    async fn upsert_agent(&self, agent: Agent) -> StoreResult<()>;

    async fn list_agents(&self, tenant_id: &str) -> StoreResult<Vec<Agent>>;

    async fn get_agent(&self, tenant_id: &str, id: &str) -> StoreResult<Option<Agent>>;

    async fn get_analytics(&self, tenant_id: &str, query: &AnalyticsQuery) -> StoreResult<Vec<AnalyticsBucket>>;

    async fn create_alert_rule(&self, rule: AlertRule) -> StoreResult<()>;

    async fn list_alert_rules(&self, tenant_id: &str) -> StoreResult<Vec<AlertRule>>;

    /// Cascades to alert history for the rule (spec §4.2 FK CASCADE).
    async fn delete_alert_rule(&self, tenant_id: &str, id: &str) -> StoreResult<()>;

    async fn record_alert_history(&self, entry: AlertHistory) -> StoreResult<()>;

    async fn list_alert_history(&self, tenant_id: &str, rule_id: Option<&str>) -> StoreResult<Vec<AlertHistory>>;

    /// Deletes events older than `cutoff`; returns the deleted count.
    async fn apply_retention(&self, tenant_id: &str, cutoff: chrono::DateTime<chrono::Utc>) -> StoreResult<u64>;

    async fn apply_audit_log_retention(&self, tenant_id: &str, cutoff: chrono::DateTime<chrono::Utc>) -> StoreResult<u64>;

    async fn get_stats(&self, tenant_id: &str) -> StoreResult<TenantStats>;

    async fn get_config(&self, tenant_id: &str) -> StoreResult<Vec<ConfigEntry>>;

    async fn set_config(&self, entry: ConfigEntry) -> StoreResult<()>;

    /// Tenants with at least one row, for the retention/partition jobs to
    /// iterate (spec §4.6 "for each active tenant").
    async fn list_tenants(&self) -> StoreResult<Vec<String>>;

    async fn record_audit_log(&self, tenant_id: &str, action: &str, detail: serde_json::Value) -> StoreResult<()>;

    async fn is_healthy(&self) -> bool;
}
