//! In-memory backend, grounded on the `RwLock<HashMap<...>>` shape of
//! `vex-persist::backend::MemoryBackend`, restructured from a flat KV map
//! into per-tenant indexed collections so the richer filters of spec
//! §4.2 can be answered without re-deserializing blobs.

use crate::backend::EventStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    AlertHistory, AlertRule, AnalyticsBucket, AnalyticsQuery, ConfigEntry, EventCounts,
    EventFilter, Order, SessionFilter, TenantStats,
};
use agentlens_core::event::{Event, Severity};
use agentlens_core::session::{Agent, Session};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct TenantData {
    events: Vec<Event>,
    event_ids: std::collections::HashSet<String>,
    last_hash: HashMap<String, String>,
    sessions: HashMap<String, Session>,
    agents: HashMap<String, Agent>,
    alert_rules: HashMap<String, AlertRule>,
    alert_history: Vec<AlertHistory>,
    config: HashMap<String, ConfigEntry>,
    audit_log: Vec<(chrono::DateTime<chrono::Utc>, String, serde_json::Value)>,
}

#[derive(Default)]
pub struct MemoryStore {
    tenants: RwLock<HashMap<String, TenantData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(event: &Event, filter: &EventFilter) -> bool {
        if let Some(sid) = &filter.session_id {
            if &event.session_id != sid {
                return false;
            }
        }
        if let Some(aid) = &filter.agent_id {
            if &event.agent_id != aid {
                return false;
            }
        }
        if let Some(types) = &filter.event_types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(sevs) = &filter.severities {
            if !sevs.contains(&event.severity) {
                return false;
            }
        }
        if let Some(from) = filter.from {
            if event.timestamp < from {
                return false;
            }
        }
        if let Some(to) = filter.to {
            if event.timestamp > to {
                return false;
            }
        }
        if let Some(search) = &filter.search {
            let haystack = serde_json::to_string(&event.payload.0).unwrap_or_default();
            if !haystack.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_events(&self, tenant_id: &str, events: Vec<Event>) -> StoreResult<()> {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(tenant_id.to_string()).or_default();

        for event in &events {
            if event.tenant_id != tenant_id {
                return Err(StoreError::Validation(format!(
                    "event {} carries tenant_id {} but was submitted under tenant {}",
                    event.id, event.tenant_id, tenant_id
                )));
            }
        }

        for event in events {
            if !data.event_ids.insert(event.id.clone()) {
                continue;
            }
            data.last_hash.insert(event.session_id.clone(), event.hash.clone());

            let is_new_session = !data.sessions.contains_key(&event.session_id);
            let session = data
                .sessions
                .entry(event.session_id.clone())
                .or_insert_with(|| Session::new(tenant_id, &event.session_id, &event.agent_id, event.timestamp));
            session.apply_event(&event);

            let agent = data.agents.entry(event.agent_id.clone()).or_insert_with(|| {
                Agent::new(tenant_id, &event.agent_id, &event.agent_id, event.timestamp)
            });
            agent.last_seen_at = event.timestamp;
            if let Some(name) = &session.agent_name {
                agent.name = name.clone();
            }
            if is_new_session {
                agent.session_count += 1;
            }

            data.events.push(event);
        }
        Ok(())
    }

    async fn get_event(&self, tenant_id: &str, id: &str) -> StoreResult<Option<Event>> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant_id)
            .and_then(|d| d.events.iter().find(|e| e.id == id).cloned()))
    }

    async fn query_events(&self, tenant_id: &str, filter: &EventFilter) -> StoreResult<(Vec<Event>, u64)> {
        let tenants = self.tenants.read().await;
        let Some(data) = tenants.get(tenant_id) else {
            return Ok((Vec::new(), 0));
        };
        let mut matched: Vec<&Event> = data.events.iter().filter(|e| Self::matches(e, filter)).collect();
        match filter.order {
            Order::Asc => matched.sort_by_key(|e| e.timestamp),
            Order::Desc => matched.sort_by_key(|e| std::cmp::Reverse(e.timestamp)),
        }
        let total = matched.len() as u64;
        let page = matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn get_session_timeline(&self, tenant_id: &str, session_id: &str) -> StoreResult<Vec<Event>> {
        let tenants = self.tenants.read().await;
        let Some(data) = tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };
        let mut events: Vec<Event> = data
            .events
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn get_last_event_hash(&self, tenant_id: &str, session_id: &str) -> StoreResult<Option<String>> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant_id)
            .and_then(|d| d.last_hash.get(session_id).cloned()))
    }

    async fn count_events(&self, tenant_id: &str, filter: &EventFilter) -> StoreResult<u64> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant_id)
            .map(|d| d.events.iter().filter(|e| Self::matches(e, filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn count_events_batch(&self, tenant_id: &str, filter: &EventFilter) -> StoreResult<EventCounts> {
        let tenants = self.tenants.read().await;
        let mut counts = EventCounts::default();
        if let Some(data) = tenants.get(tenant_id) {
            for e in data.events.iter().filter(|e| Self::matches(e, filter)) {
                counts.total += 1;
                match e.severity {
                    Severity::Error => counts.error += 1,
                    Severity::Critical => counts.critical += 1,
                    _ => {}
                }
                if e.event_type == agentlens_core::event::EventType::ToolError {
                    counts.tool_error += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn upsert_session(&self, session: Session) -> StoreResult<()> {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(session.tenant_id.clone()).or_default();
        data.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn query_sessions(&self, tenant_id: &str, filter: &SessionFilter) -> StoreResult<(Vec<Session>, u64)> {
        let tenants = self.tenants.read().await;
        let Some(data) = tenants.get(tenant_id) else {
            return Ok((Vec::new(), 0));
        };
        let mut matched: Vec<&Session> = data
            .sessions
            .values()
            .filter(|s| {
                if let Some(aid) = &filter.agent_id {
                    if &s.agent_id != aid {
                        return false;
                    }
                }
                if let Some(status) = filter.status {
                    if s.status != status {
                        return false;
                    }
                }
                if let Some(from) = filter.from {
                    if s.started_at < from {
                        return false;
                    }
                }
                if let Some(to) = filter.to {
                    if s.started_at > to {
                        return false;
                    }
                }
                if let Some(tags) = &filter.tags {
                    if !tags.iter().all(|t| s.tags.contains(t)) {
                        return false;
                    }
                }
                true
            })
            .collect();
        matched.sort_by_key(|s| std::cmp::Reverse(s.started_at));
        let total = matched.len() as u64;
        let page = matched.into_iter().skip(filter.offset).take(filter.limit).cloned().collect();
        Ok((page, total))
    }

    async fn get_session(&self, tenant_id: &str, id: &str) -> StoreResult<Option<Session>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(tenant_id).and_then(|d| d.sessions.get(id).cloned()))
    }

    async fn upsert_agent(&self, agent: Agent) -> StoreResult<()> {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(agent.tenant_id.clone()).or_default();
        data.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn list_agents(&self, tenant_id: &str) -> StoreResult<Vec<Agent>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(tenant_id).map(|d| d.agents.values().cloned().collect()).unwrap_or_default())
    }

    async fn get_agent(&self, tenant_id: &str, id: &str) -> StoreResult<Option<Agent>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(tenant_id).and_then(|d| d.agents.get(id).cloned()))
    }

    async fn get_analytics(&self, tenant_id: &str, query: &AnalyticsQuery) -> StoreResult<Vec<AnalyticsBucket>> {
        let tenants = self.tenants.read().await;
        let Some(data) = tenants.get(tenant_id) else {
            return Ok(Vec::new());
        };
        Ok(crate::types::bucket_events(&data.events, query))
    }

    async fn create_alert_rule(&self, rule: AlertRule) -> StoreResult<()> {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(rule.tenant_id.clone()).or_default();
        data.alert_rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    async fn list_alert_rules(&self, tenant_id: &str) -> StoreResult<Vec<AlertRule>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(tenant_id).map(|d| d.alert_rules.values().cloned().collect()).unwrap_or_default())
    }

    async fn delete_alert_rule(&self, tenant_id: &str, id: &str) -> StoreResult<()> {
        let mut tenants = self.tenants.write().await;
        if let Some(data) = tenants.get_mut(tenant_id) {
            data.alert_rules.remove(id);
            data.alert_history.retain(|h| h.rule_id != id);
        }
        Ok(())
    }

    async fn record_alert_history(&self, entry: AlertHistory) -> StoreResult<()> {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(entry.tenant_id.clone()).or_default();
        data.alert_history.push(entry);
        Ok(())
    }

    async fn list_alert_history(&self, tenant_id: &str, rule_id: Option<&str>) -> StoreResult<Vec<AlertHistory>> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant_id)
            .map(|d| {
                d.alert_history
                    .iter()
                    .filter(|h| rule_id.map(|r| h.rule_id == r).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn apply_retention(&self, tenant_id: &str, cutoff: chrono::DateTime<chrono::Utc>) -> StoreResult<u64> {
        let mut tenants = self.tenants.write().await;
        let Some(data) = tenants.get_mut(tenant_id) else {
            return Ok(0);
        };
        let before = data.events.len();
        data.events.retain(|e| e.timestamp >= cutoff);
        Ok((before - data.events.len()) as u64)
    }

    async fn apply_audit_log_retention(&self, tenant_id: &str, cutoff: chrono::DateTime<chrono::Utc>) -> StoreResult<u64> {
        let mut tenants = self.tenants.write().await;
        let Some(data) = tenants.get_mut(tenant_id) else {
            return Ok(0);
        };
        let before = data.audit_log.len();
        data.audit_log.retain(|(ts, _, _)| *ts >= cutoff);
        Ok((before - data.audit_log.len()) as u64)
    }

    async fn get_stats(&self, tenant_id: &str) -> StoreResult<TenantStats> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant_id)
            .map(|d| TenantStats {
                event_count: d.events.len() as u64,
                session_count: d.sessions.len() as u64,
                agent_count: d.agents.len() as u64,
            })
            .unwrap_or_default())
    }

    async fn get_config(&self, tenant_id: &str) -> StoreResult<Vec<ConfigEntry>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(tenant_id).map(|d| d.config.values().cloned().collect()).unwrap_or_default())
    }

    async fn set_config(&self, entry: ConfigEntry) -> StoreResult<()> {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(entry.tenant_id.clone()).or_default();
        data.config.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn list_tenants(&self) -> StoreResult<Vec<String>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.keys().cloned().collect())
    }

    async fn record_audit_log(&self, tenant_id: &str, action: &str, detail: serde_json::Value) -> StoreResult<()> {
        let mut tenants = self.tenants.write().await;
        let data = tenants.entry(tenant_id.to_string()).or_default();
        data.audit_log.push((chrono::Utc::now(), action.to_string(), detail));
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlens_core::event::{EventType, OrderedObject};
    use agentlens_core::hash::HashInput;

    fn make_event(tenant: &str, session: &str, agent: &str, id: &str, prev: Option<&str>, ts: chrono::DateTime<chrono::Utc>) -> Event {
        let payload = OrderedObject::new();
        let metadata = OrderedObject::new();
        let hash = HashInput {
            id,
            timestamp: &ts,
            session_id: session,
            agent_id: agent,
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload: &payload,
            metadata: &metadata,
            prev_hash: prev,
        }
        .compute_hash();
        Event {
            id: id.to_string(),
            timestamp: ts,
            session_id: session.to_string(),
            agent_id: agent.to_string(),
            tenant_id: tenant.to_string(),
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload,
            metadata,
            prev_hash: prev.map(str::to_string),
            hash,
        }
    }

    #[tokio::test]
    async fn tenant_isolation_on_shared_session_id() {
        let store = MemoryStore::new();
        let ts = chrono::Utc::now();
        let ea = make_event("t_a", "shared", "shared", "e1", None, ts);
        let eb = make_event("t_b", "shared", "shared", "e1", None, ts);
        store.insert_events("t_a", vec![ea]).await.unwrap();
        store.insert_events("t_b", vec![eb]).await.unwrap();

        let timeline_a = store.get_session_timeline("t_a", "shared").await.unwrap();
        let timeline_b = store.get_session_timeline("t_b", "shared").await.unwrap();
        assert_eq!(timeline_a.len(), 1);
        assert_eq!(timeline_b.len(), 1);

        let agents_a = store.list_agents("t_a").await.unwrap();
        let agents_b = store.list_agents("t_b").await.unwrap();
        assert_eq!(agents_a.len(), 1);
        assert_eq!(agents_b.len(), 1);
        assert_eq!(agents_a[0].session_count, 1);
        assert_eq!(agents_b[0].session_count, 1);
    }

    #[tokio::test]
    async fn insert_rejects_tenant_mismatch() {
        let store = MemoryStore::new();
        let ts = chrono::Utc::now();
        let event = make_event("t_a", "s1", "a1", "e1", None, ts);
        let result = store.insert_events("t_b", vec![event]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn retention_respects_cutoff() {
        let store = MemoryStore::new();
        let old = chrono::Utc::now() - chrono::Duration::days(10);
        let recent = chrono::Utc::now();
        let e1 = make_event("t_a", "s1", "a1", "e1", None, old);
        let e2 = make_event("t_a", "s1", "a1", "e2", Some(&e1.hash), recent);
        store.insert_events("t_a", vec![e1, e2]).await.unwrap();

        let cutoff = chrono::Utc::now() - chrono::Duration::days(1);
        let deleted = store.apply_retention("t_a", cutoff).await.unwrap();
        assert_eq!(deleted, 1);
        let remaining = store.get_session_timeline("t_a", "s1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].timestamp >= cutoff);
    }
}
