//! NDJSON export/import (spec §4.6), grounded on the store's own
//! per-entity DTOs — there is no teacher equivalent, so the emission
//! order and checksum framing follow the spec directly. Lines are built
//! as plain `serde_json::Value`s rather than through a tagged enum so
//! `tenantId` can be dropped from the emitted row instead of merely
//! blanked.

use crate::backend::EventStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{EventFilter, Order, SessionFilter};
use agentlens_core::event::Event;
use agentlens_core::session::{Agent, Session};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const EXPORT_VERSION: u32 = 1;

fn record_line(record_type: &str, body: &impl Serialize) -> StoreResult<String> {
    let mut map = match serde_json::to_value(body)? {
        Value::Object(m) => m,
        other => {
            let mut m = Map::new();
            m.insert("value".to_string(), other);
            m
        }
    };
    map.remove("tenant_id");
    map.remove("tenantId");
    let mut ordered = Map::new();
    ordered.insert("_type".to_string(), Value::String(record_type.to_string()));
    ordered.insert("_version".to_string(), Value::from(EXPORT_VERSION));
    ordered.extend(map);
    Ok(serde_json::to_string(&Value::Object(ordered))?)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportCounts {
    pub agents: u64,
    pub sessions: u64,
    pub events: u64,
}

#[derive(Debug, Clone)]
pub struct ExportRange {
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
}

/// Stream `tenant_id`'s agents, sessions, and events as NDJSON lines,
/// dependency-ordered (agents, then sessions, then events), with a
/// trailing checksum line covering everything emitted before it.
pub async fn export_org_data(store: &Arc<dyn EventStore>, tenant_id: &str, range: &ExportRange) -> StoreResult<Vec<String>> {
    let mut lines = Vec::new();
    let mut counts = ExportCounts::default();

    for agent in store.list_agents(tenant_id).await? {
        lines.push(record_line("agent", &agent)?);
        counts.agents += 1;
    }

    let (sessions, _) = store
        .query_sessions(
            tenant_id,
            &SessionFilter {
                from: range.from,
                to: range.to,
                limit: usize::MAX,
                ..SessionFilter::new()
            },
        )
        .await?;
    for session in sessions {
        lines.push(record_line("session", &session)?);
        counts.sessions += 1;
    }

    let (events, _) = store
        .query_events(
            tenant_id,
            &EventFilter {
                from: range.from,
                to: range.to,
                limit: usize::MAX,
                order: Order::Asc,
                ..EventFilter::new()
            },
        )
        .await?;
    for event in events {
        lines.push(record_line("event", &event)?);
        counts.events += 1;
    }

    let sha256 = checksum_of(&lines);
    let mut checksum = Map::new();
    checksum.insert("_type".to_string(), Value::String("checksum".to_string()));
    checksum.insert("sha256".to_string(), Value::String(sha256));
    checksum.insert("counts".to_string(), serde_json::to_value(&counts)?);
    checksum.insert("exported_at".to_string(), Value::String(chrono::Utc::now().to_rfc3339()));
    lines.push(serde_json::to_string(&Value::Object(checksum))?);

    Ok(lines)
}

fn checksum_of(lines: &[String]) -> String {
    let mut hasher = Sha256::new();
    for line in lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResult {
    pub imported: ExportCounts,
    pub errors: Vec<String>,
    /// `None` when no checksum line was present.
    pub checksum_valid: Option<bool>,
}

/// Import NDJSON `lines` into `tenant_id`, stamping every row with the
/// target tenant and relying on each backend's conflict-do-nothing
/// semantics so re-importing the same export is a no-op (spec §4.6).
pub async fn import_org_data(store: &Arc<dyn EventStore>, tenant_id: &str, lines: &[String]) -> StoreResult<ImportResult> {
    let mut result = ImportResult::default();
    let mut data_lines: Vec<&str> = Vec::new();
    let mut checksum: Option<String> = None;

    let mut agents = Vec::new();
    let mut sessions = Vec::new();
    let mut events = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                result.errors.push(format!("line {i}: invalid json: {e}"));
                continue;
            }
        };
        // `tenant_id` was stripped on export; every entity struct still
        // requires the field to deserialize, so seed a placeholder that
        // gets overwritten with the real target tenant right after.
        if let Value::Object(map) = &mut value {
            map.entry("tenant_id").or_insert(Value::String(String::new()));
        }
        match value.get("_type").and_then(Value::as_str) {
            Some("agent") => match serde_json::from_value::<Agent>(value) {
                Ok(mut a) => {
                    a.tenant_id = tenant_id.to_string();
                    agents.push(a);
                    data_lines.push(line);
                }
                Err(e) => result.errors.push(format!("line {i}: malformed agent: {e}")),
            },
            Some("session") => match serde_json::from_value::<Session>(value) {
                Ok(mut s) => {
                    s.tenant_id = tenant_id.to_string();
                    sessions.push(s);
                    data_lines.push(line);
                }
                Err(e) => result.errors.push(format!("line {i}: malformed session: {e}")),
            },
            Some("event") => match serde_json::from_value::<Event>(value) {
                Ok(mut e) => {
                    e.tenant_id = tenant_id.to_string();
                    events.push(e);
                    data_lines.push(line);
                }
                Err(e) => result.errors.push(format!("line {i}: malformed event: {e}")),
            },
            Some("checksum") => {
                checksum = value.get("sha256").and_then(Value::as_str).map(str::to_string);
            }
            Some(other) => result.errors.push(format!("line {i}: unknown record type `{other}`")),
            None => result.errors.push(format!("line {i}: missing `_type` discriminant")),
        }
    }

    if let Some(expected) = &checksum {
        let owned: Vec<String> = data_lines.iter().map(|s| s.to_string()).collect();
        result.checksum_valid = Some(&checksum_of(&owned) == expected);
    }

    for agent in agents {
        match store.upsert_agent(agent).await {
            Ok(()) => result.imported.agents += 1,
            Err(StoreError::AlreadyExists(_)) => {}
            Err(e) => result.errors.push(format!("agent import failed: {e}")),
        }
    }
    for session in sessions {
        match store.upsert_session(session).await {
            Ok(()) => result.imported.sessions += 1,
            Err(StoreError::AlreadyExists(_)) => {}
            Err(e) => result.errors.push(format!("session import failed: {e}")),
        }
    }
    if !events.is_empty() {
        let n = events.len() as u64;
        match store.insert_events(tenant_id, events).await {
            Ok(()) => result.imported.events += n,
            Err(StoreError::AlreadyExists(_)) => {}
            Err(e) => result.errors.push(format!("event import failed: {e}")),
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use agentlens_core::event::{EventType, OrderedObject, Severity};
    use agentlens_core::hash::HashInput;

    fn make_event(tenant: &str, session: &str, agent: &str, id: &str) -> Event {
        let ts = chrono::Utc::now();
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
            prev_hash: None,
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
            prev_hash: None,
            hash,
        }
    }

    #[tokio::test]
    async fn export_strips_tenant_id_and_import_restamps_it() {
        let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
        let event = make_event("src", "s1", "a1", "e1");
        store.insert_events("src", vec![event]).await.unwrap();

        let lines = export_org_data(&store, "src", &ExportRange { from: None, to: None }).await.unwrap();
        let event_line: Value = lines.iter().find_map(|l| {
            let v: Value = serde_json::from_str(l).unwrap();
            (v.get("_type").and_then(Value::as_str) == Some("event")).then_some(v)
        }).unwrap();
        assert!(event_line.get("tenant_id").is_none());
        assert!(lines.last().unwrap().contains("\"checksum\""));

        let result = import_org_data(&store, "dst", &lines).await.unwrap();
        assert_eq!(result.checksum_valid, Some(true));
        assert_eq!(result.imported.events, 1);
        assert!(result.errors.is_empty());

        let timeline = store.get_session_timeline("dst", "s1").await.unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].tenant_id, "dst");
    }

    #[tokio::test]
    async fn import_flags_invalid_json_without_aborting() {
        let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
        let lines = vec!["not json".to_string(), "{\"_type\":\"bogus\"}".to_string()];
        let result = import_org_data(&store, "dst", &lines).await.unwrap();
        assert_eq!(result.errors.len(), 2);
    }
}
