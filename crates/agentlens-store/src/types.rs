//! Query/filter/DTO types shared by every backend (spec §4.2).

use agentlens_core::event::{Event, EventType, Severity};
use agentlens_core::session::SessionStatus;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub event_types: Option<HashSet<EventType>>,
    pub severities: Option<HashSet<Severity>>,
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
    pub search: Option<String>,
    pub order: Order,
    pub limit: usize,
    pub offset: usize,
}

impl EventFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub agent_id: Option<String>,
    pub status: Option<SessionStatus>,
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
    pub tags: Option<Vec<String>>,
    pub limit: usize,
    pub offset: usize,
}

impl SessionFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hour,
    Day,
}

#[derive(Debug, Clone)]
pub struct AnalyticsQuery {
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
    pub granularity: Granularity,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct AnalyticsBucket {
    pub bucket_start: chrono::DateTime<chrono::Utc>,
    pub event_count: u64,
    pub tool_call_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub total_cost_usd: f64,
    pub unique_sessions: u64,
    pub unique_agents: u64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct EventCounts {
    pub total: u64,
    pub error: u64,
    pub critical: u64,
    pub tool_error: u64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct TenantStats {
    pub event_count: u64,
    pub session_count: u64,
    pub agent_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub tenant_id: String,
    pub id: String,
    pub name: String,
    pub condition: String,
    pub threshold: f64,
    pub enabled: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertHistory {
    pub tenant_id: String,
    pub id: String,
    pub rule_id: String,
    pub triggered_at: chrono::DateTime<chrono::Utc>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
    pub detail: String,
}

/// Group `events` into `query`'s buckets. Shared by every backend so the
/// aggregation rules (cost attribution, error counting, unique counts)
/// live in one place rather than being re-derived per storage engine.
pub fn bucket_events(events: &[Event], query: &AnalyticsQuery) -> Vec<AnalyticsBucket> {
    let bucket_secs = match query.granularity {
        Granularity::Hour => 3600,
        Granularity::Day => 86400,
    };
    let mut buckets: HashMap<i64, AnalyticsBucket> = HashMap::new();
    let mut sessions_seen: HashMap<i64, HashSet<String>> = HashMap::new();
    let mut agents_seen: HashMap<i64, HashSet<String>> = HashMap::new();
    let mut latency_sum: HashMap<i64, f64> = HashMap::new();
    let mut latency_count: HashMap<i64, u64> = HashMap::new();

    for e in events {
        if e.timestamp < query.from || e.timestamp > query.to {
            continue;
        }
        if let Some(aid) = &query.agent_id {
            if &e.agent_id != aid {
                continue;
            }
        }
        let offset = (e.timestamp - query.from).num_seconds() / bucket_secs;
        let bucket_start = query.from + chrono::Duration::seconds(offset * bucket_secs);
        let b = buckets.entry(offset).or_insert_with(|| AnalyticsBucket {
            bucket_start,
            ..Default::default()
        });
        b.event_count += 1;
        match e.event_type {
            EventType::ToolCall => b.tool_call_count += 1,
            EventType::LlmResponse | EventType::CostTracked => b.total_cost_usd += e.payload.cost_usd(),
            _ => {}
        }
        if e.event_type == EventType::ToolError || matches!(e.severity, Severity::Error | Severity::Critical) {
            b.error_count += 1;
        }
        if let Some(latency) = e.payload.get("latencyMs").and_then(|v| v.as_f64()) {
            *latency_sum.entry(offset).or_insert(0.0) += latency;
            *latency_count.entry(offset).or_insert(0) += 1;
        }
        sessions_seen.entry(offset).or_default().insert(e.session_id.clone());
        agents_seen.entry(offset).or_default().insert(e.agent_id.clone());
    }

    let mut result: Vec<AnalyticsBucket> = buckets
        .into_iter()
        .map(|(offset, mut b)| {
            b.unique_sessions = sessions_seen.get(&offset).map(|s| s.len() as u64).unwrap_or(0);
            b.unique_agents = agents_seen.get(&offset).map(|s| s.len() as u64).unwrap_or(0);
            b.avg_latency_ms = match latency_count.get(&offset) {
                Some(&count) if count > 0 => latency_sum.get(&offset).copied().unwrap_or(0.0) / count as f64,
                _ => 0.0,
            };
            b
        })
        .collect();
    result.sort_by_key(|b| b.bucket_start);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlens_core::event::OrderedObject;

    fn event_with_latency(latency_ms: f64) -> Event {
        let mut payload = OrderedObject::new();
        payload.0.insert("latencyMs".to_string(), serde_json::json!(latency_ms));
        Event {
            id: "e1".to_string(),
            timestamp: chrono::Utc::now(),
            session_id: "s1".to_string(),
            agent_id: "a1".to_string(),
            tenant_id: "t1".to_string(),
            event_type: EventType::ToolResponse,
            severity: Severity::Info,
            payload,
            metadata: OrderedObject::new(),
            prev_hash: None,
            hash: "h1".to_string(),
        }
    }

    #[test]
    fn avg_latency_ms_is_the_mean_of_events_carrying_it() {
        let events = vec![event_with_latency(100.0), event_with_latency(300.0)];
        let query = AnalyticsQuery {
            from: events[0].timestamp - chrono::Duration::seconds(1),
            to: events[0].timestamp + chrono::Duration::seconds(1),
            granularity: Granularity::Hour,
            agent_id: None,
        };
        let buckets = bucket_events(&events, &query);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].avg_latency_ms, 200.0);
    }

    #[test]
    fn avg_latency_ms_is_zero_when_no_event_carries_it() {
        let mut event = event_with_latency(0.0);
        event.payload = OrderedObject::new();
        let events = vec![event];
        let query = AnalyticsQuery {
            from: events[0].timestamp - chrono::Duration::seconds(1),
            to: events[0].timestamp + chrono::Duration::seconds(1),
            granularity: Granularity::Hour,
            agent_id: None,
        };
        let buckets = bucket_events(&events, &query);
        assert_eq!(buckets[0].avg_latency_ms, 0.0);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub tenant_id: String,
    pub key: String,
    pub value: serde_json::Value,
    pub is_secret: bool,
}
