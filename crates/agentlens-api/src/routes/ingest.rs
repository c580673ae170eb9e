//! `POST /api/events` (spec §4.3): validate, assign id/hash/prevHash
//! under a per-session lock, insert atomically, then fan out bus
//! messages. Grounded on `vex-api::routes`'s handler shape, with the
//! session-serialization lock and rate limiter that have no teacher
//! analog built directly against the spec.

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use agentlens_core::event::{Event, EventType, IngestEventInput};
use agentlens_core::hash::HashInput;
use agentlens_core::ids::new_event_id;
use agentlens_core::retention::PlanTier;
use agentlens_store::{AlertHistory, AlertRule};

use crate::auth::AuthContext;
use crate::bus::BusMessage;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Maximum serialized `payload` size before it is truncated with a flag
/// rather than the whole event being rejected (spec §4.3: "truncate is
/// preferred over reject... implementation chooses but documents").
const MAX_PAYLOAD_BYTES: usize = 32 * 1024;

/// Per-`(tenant_id, session_id)` locks serializing the hash-chain
/// append. Independent sessions ingest fully in parallel (spec §4.3,
/// §5). The map itself is a short-held lock; the per-session `Mutex` is
/// what actually serializes a session's writers.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub async fn lock_for(&self, tenant_id: &str, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry((tenant_id.to_string(), session_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub events: Vec<IngestEventInput>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub inserted: usize,
    pub ids: Vec<String>,
}

fn validate_input(input: &IngestEventInput) -> Result<(), String> {
    if input.session_id.trim().is_empty() {
        return Err("sessionId must not be empty".to_string());
    }
    if input.agent_id.trim().is_empty() {
        return Err("agentId must not be empty".to_string());
    }
    input.payload.has_required(input.event_type.required_fields())
}

/// Truncates an oversized `payload.data` field in place and flags it,
/// rather than rejecting the whole event.
fn truncate_if_oversized(payload: &mut agentlens_core::event::OrderedObject) -> bool {
    let size = serde_json::to_vec(&payload.0).map(|v| v.len()).unwrap_or(0);
    if size <= MAX_PAYLOAD_BYTES {
        return false;
    }
    if let Some(data) = payload.0.get_mut("data") {
        if let Some(s) = data.as_str() {
            let truncated: String = s.chars().take(1024).collect();
            *data = serde_json::Value::String(truncated);
        }
    }
    payload.0.insert("truncated".to_string(), serde_json::Value::Bool(true));
    true
}

pub async fn ingest_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<IngestRequest>,
) -> ApiResult<Json<IngestResponse>> {
    let locks = state.session_locks();
    if body.events.is_empty() {
        return Err(ApiError::Validation("events must not be empty".to_string()));
    }
    for input in &body.events {
        validate_input(input).map_err(ApiError::Validation)?;
    }

    // TODO(agentlens): plan tier should come from the tenant's billing
    // record once that surface exists; default to free until then.
    let tier = PlanTier::Free;
    let count = body.events.len() as u64;
    state
        .rate_limiter()
        .check(&auth.tenant_id, &auth.key_id.to_string(), tier, count)
        .await
        .map_err(|r| ApiError::RateLimited { retry_after_secs: r.retry_after_secs })?;

    let store = state.store();
    let mut sessions_touched: HashSet<String> = HashSet::new();
    let mut assigned: Vec<Event> = Vec::with_capacity(body.events.len());

    // Group inputs by session so each session's lock is taken once and
    // the batch's own prevHash chaining is correct even across inputs
    // for the same session within this request.
    let mut by_session: HashMap<String, Vec<IngestEventInput>> = HashMap::new();
    for input in body.events {
        by_session.entry(input.session_id.clone()).or_default().push(input);
    }

    // Each session's lock is held from the last-hash lookup through that
    // session's own insert committing (spec §4.3: "acquire a per-session
    // lock before the last-hash lookup and release it after the insert
    // commits"). Releasing it any earlier — e.g. after building the
    // batch but before the insert — would let two concurrent requests to
    // the same session both read the same stale `prevHash` and fork the
    // chain, breaking P5.
    for (session_id, inputs) in by_session {
        let lock = locks.lock_for(&auth.tenant_id, &session_id).await;
        let _guard = lock.lock().await;

        let mut prev_hash = store.get_last_event_hash(&auth.tenant_id, &session_id).await?;
        let mut session_events: Vec<Event> = Vec::with_capacity(inputs.len());
        for mut input in inputs {
            let truncated = truncate_if_oversized(&mut input.payload);
            if truncated {
                tracing::warn!(tenant_id = %auth.tenant_id, session_id = %session_id, "payload truncated on ingest");
            }
            let id = new_event_id();
            let timestamp = input.timestamp.unwrap_or_else(chrono::Utc::now);
            let hash = HashInput {
                id: &id,
                timestamp: &timestamp,
                session_id: &session_id,
                agent_id: &input.agent_id,
                event_type: input.event_type,
                severity: input.severity,
                payload: &input.payload,
                metadata: &input.metadata,
                prev_hash: prev_hash.as_deref(),
            }
            .compute_hash();

            let event = Event {
                id,
                timestamp,
                session_id: session_id.clone(),
                agent_id: input.agent_id,
                tenant_id: auth.tenant_id.clone(),
                event_type: input.event_type,
                severity: input.severity,
                payload: input.payload,
                metadata: input.metadata,
                prev_hash: prev_hash.clone(),
                hash: hash.clone(),
            };
            prev_hash = Some(hash);
            session_events.push(event);
        }

        store.insert_events(&auth.tenant_id, session_events.clone()).await?;
        assigned.extend(session_events);
        sessions_touched.insert(session_id);
    }

    let ids: Vec<String> = assigned.iter().map(|e| e.id.clone()).collect();

    let now = chrono::Utc::now();
    for event in assigned {
        state.bus().publish(BusMessage::EventIngested {
            tenant_id: auth.tenant_id.clone(),
            event,
            timestamp: now,
        });
    }
    for session_id in &sessions_touched {
        if let Some(session) = store.get_session(&auth.tenant_id, session_id).await? {
            state.bus().publish(BusMessage::SessionUpdated {
                tenant_id: auth.tenant_id.clone(),
                session: session.clone(),
                timestamp: now,
            });
            check_alert_rules(&state, &auth.tenant_id, &session).await?;
        }
    }

    Ok(Json(IngestResponse { inserted: ids.len(), ids }))
}

/// Evaluates every enabled alert rule against the just-updated session's
/// aggregates and records+publishes any that cross their threshold.
/// Conditions are plain field names on `Session` (`error_count`,
/// `total_cost_usd`, `tool_call_count`); unknown conditions are ignored.
async fn check_alert_rules(
    state: &AppState,
    tenant_id: &str,
    session: &agentlens_core::session::Session,
) -> ApiResult<()> {
    let rules = state.store().list_alert_rules(tenant_id).await?;
    for rule in rules.into_iter().filter(|r: &AlertRule| r.enabled) {
        let value = match rule.condition.as_str() {
            "error_count" => session.error_count as f64,
            "total_cost_usd" => session.total_cost_usd,
            "tool_call_count" => session.tool_call_count as f64,
            _ => continue,
        };
        if value < rule.threshold {
            continue;
        }
        let history = AlertHistory {
            tenant_id: tenant_id.to_string(),
            id: new_event_id(),
            rule_id: rule.id.clone(),
            triggered_at: chrono::Utc::now(),
            resolved_at: None,
            detail: format!("{} = {} crossed threshold {}", rule.condition, value, rule.threshold),
        };
        state.store().record_alert_history(history.clone()).await?;
        state.bus().publish(BusMessage::AlertTriggered {
            tenant_id: tenant_id.to_string(),
            rule_id: rule.id.clone(),
            history,
        });
    }
    Ok(())
}

/// `EventType::ALL` is consulted by the query route for request
/// validation; kept here as a reminder the closed taxonomy in
/// `agentlens_core::event` is the single source of truth.
#[allow(dead_code)]
const _: [EventType; 18] = EventType::ALL;

#[cfg(test)]
mod tests {
    use super::*;
    use agentlens_core::event::{OrderedObject, Severity};

    #[test]
    fn validate_rejects_empty_session_id() {
        let input = IngestEventInput {
            timestamp: None,
            session_id: "".into(),
            agent_id: "a1".into(),
            event_type: EventType::Custom,
            severity: Severity::Info,
            payload: OrderedObject::new(),
            metadata: OrderedObject::new(),
        };
        assert!(validate_input(&input).is_err());
    }

    #[test]
    fn validate_rejects_missing_required_payload_field() {
        let input = IngestEventInput {
            timestamp: None,
            session_id: "s1".into(),
            agent_id: "a1".into(),
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload: OrderedObject::new(),
            metadata: OrderedObject::new(),
        };
        assert!(validate_input(&input).is_err());
    }

    #[test]
    fn oversized_payload_is_truncated_and_flagged() {
        let mut payload = OrderedObject::new();
        payload.0.insert("data".to_string(), serde_json::Value::String("x".repeat(64 * 1024)));
        assert!(truncate_if_oversized(&mut payload));
        assert_eq!(payload.0.get("truncated"), Some(&serde_json::Value::Bool(true)));
    }
}
