//! The tenant-scoped wrapper (spec §4.2 "Tenant scoping discipline").
//!
//! Every read path in the HTTP layer goes through this wrapper rather
//! than the raw `EventStore`; the raw store is reserved for ingestion,
//! retention, and export, which legitimately need cross-row or
//! cross-tenant access. Grounded on the tenant-key-prefixing discipline
//! in `vex-persist::audit_store::AuditStore`, lifted into a dedicated
//! type instead of being repeated inline in every store method.

use crate::backend::EventStore;
use crate::error::StoreResult;
use crate::types::{
    AlertHistory, AlertRule, AnalyticsBucket, AnalyticsQuery, ConfigEntry, EventCounts,
    EventFilter, SessionFilter, TenantStats,
};
use agentlens_core::event::Event;
use agentlens_core::session::{Agent, Session};
use std::sync::Arc;

#[derive(Clone)]
pub struct TenantScopedStore {
    inner: Arc<dyn EventStore>,
    tenant_id: String,
}

impl TenantScopedStore {
    pub fn new(inner: Arc<dyn EventStore>, tenant_id: impl Into<String>) -> Self {
        Self {
            inner,
            tenant_id: tenant_id.into(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub async fn get_event(&self, id: &str) -> StoreResult<Option<Event>> {
        self.inner.get_event(&self.tenant_id, id).await
    }

    pub async fn query_events(&self, filter: &EventFilter) -> StoreResult<(Vec<Event>, u64)> {
        self.inner.query_events(&self.tenant_id, filter).await
    }

    pub async fn get_session_timeline(&self, session_id: &str) -> StoreResult<Vec<Event>> {
        self.inner.get_session_timeline(&self.tenant_id, session_id).await
    }

    pub async fn count_events(&self, filter: &EventFilter) -> StoreResult<u64> {
        self.inner.count_events(&self.tenant_id, filter).await
    }

    pub async fn count_events_batch(&self, filter: &EventFilter) -> StoreResult<EventCounts> {
        self.inner.count_events_batch(&self.tenant_id, filter).await
    }

    pub async fn query_sessions(&self, filter: &SessionFilter) -> StoreResult<(Vec<Session>, u64)> {
        self.inner.query_sessions(&self.tenant_id, filter).await
    }

    pub async fn get_session(&self, id: &str) -> StoreResult<Option<Session>> {
        self.inner.get_session(&self.tenant_id, id).await
    }

    pub async fn list_agents(&self) -> StoreResult<Vec<Agent>> {
        self.inner.list_agents(&self.tenant_id).await
    }

    pub async fn get_agent(&self, id: &str) -> StoreResult<Option<Agent>> {
        self.inner.get_agent(&self.tenant_id, id).await
    }

    pub async fn get_analytics(&self, query: &AnalyticsQuery) -> StoreResult<Vec<AnalyticsBucket>> {
        self.inner.get_analytics(&self.tenant_id, query).await
    }

    pub async fn create_alert_rule(&self, mut rule: AlertRule) -> StoreResult<()> {
        rule.tenant_id = self.tenant_id.clone();
        self.inner.create_alert_rule(rule).await
    }

    pub async fn list_alert_rules(&self) -> StoreResult<Vec<AlertRule>> {
        self.inner.list_alert_rules(&self.tenant_id).await
    }

    pub async fn delete_alert_rule(&self, id: &str) -> StoreResult<()> {
        self.inner.delete_alert_rule(&self.tenant_id, id).await
    }

    pub async fn list_alert_history(&self, rule_id: Option<&str>) -> StoreResult<Vec<AlertHistory>> {
        self.inner.list_alert_history(&self.tenant_id, rule_id).await
    }

    pub async fn get_stats(&self) -> StoreResult<TenantStats> {
        self.inner.get_stats(&self.tenant_id).await
    }

    pub async fn get_config(&self) -> StoreResult<Vec<ConfigEntry>> {
        self.inner.get_config(&self.tenant_id).await
    }

    pub async fn set_config(&self, mut entry: ConfigEntry) -> StoreResult<()> {
        entry.tenant_id = self.tenant_id.clone();
        self.inner.set_config(entry).await
    }
}
