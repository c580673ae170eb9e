//! OTLP receiver (spec §6, SPEC_FULL.md §C "OTLP mapping table"):
//! `POST /v1/traces`, `/v1/metrics`, `/v1/logs`. JSON body only — the
//! protobuf variant is a documented gap, see `DESIGN.md`. No teacher
//! analog; the bearer check and per-IP limiter are built directly
//! against the spec's "optional bearer, constant-time compare" and
//! "per-IP fixed-window 1000/min" requirements, reusing the constant-time
//! comparison idiom (`subtle::ConstantTimeEq`) already used for API-key
//! verification in `agentlens-store::api_key`.

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Instant;
use subtle::ConstantTimeEq;

use agentlens_core::event::{Event, EventType, IngestEventInput, OrderedObject, Severity};
use agentlens_core::hash::HashInput;
use agentlens_core::ids::new_event_id;

use crate::bus::BusMessage;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const OTLP_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
const OTLP_IP_LIMIT_PER_MIN: u64 = 1000;

/// Per-IP fixed window, independent of the ingestion rate limiter
/// (different key space: remote address, not API key).
pub struct OtlpIpLimiter {
    windows: Mutex<HashMap<SocketAddr, (u64, Instant)>>,
}

impl Default for OtlpIpLimiter {
    fn default() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl OtlpIpLimiter {
    pub fn check(&self, addr: SocketAddr) -> bool {
        let mut windows = self.windows.lock().unwrap();
        let now = Instant::now();
        let entry = windows.entry(addr).or_insert((0, now));
        if now.duration_since(entry.1).as_secs() >= 60 {
            *entry = (0, now);
        }
        if entry.0 >= OTLP_IP_LIMIT_PER_MIN {
            return false;
        }
        entry.0 += 1;
        true
    }
}

fn check_bearer(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.otlp_bearer_token() else {
        return Ok(());
    };
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Auth("missing OTLP bearer token".to_string()))?;
    if provided.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(ApiError::Auth("invalid OTLP bearer token".to_string()))
    }
}

/// Tenant resolution precedence (spec §6): auth context (not used here,
/// OTLP has its own bearer scheme rather than API keys) → the
/// `openclaw.tenant_id` resource attribute → `default`.
fn resolve_tenant(resource_attrs: &HashMap<String, serde_json::Value>, multi_tenant: bool) -> ApiResult<String> {
    match resource_attrs.get("openclaw.tenant_id").and_then(|v| v.as_str()) {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ if multi_tenant => Err(ApiError::Validation(
            "openclaw.tenant_id resource attribute is required in multi-tenant mode".to_string(),
        )),
        _ => Ok("default".to_string()),
    }
}

fn map_otlp_severity(text: &str) -> Severity {
    match text.to_ascii_uppercase().as_str() {
        "TRACE" | "DEBUG" | "DEBUG2" | "DEBUG3" | "DEBUG4" => Severity::Debug,
        "INFO" | "INFO2" | "INFO3" | "INFO4" => Severity::Info,
        "WARN" | "WARN2" | "WARN3" | "WARN4" => Severity::Warn,
        "ERROR" | "ERROR2" | "ERROR3" | "ERROR4" => Severity::Error,
        "FATAL" | "FATAL2" | "FATAL3" | "FATAL4" => Severity::Critical,
        _ => Severity::Info,
    }
}

/// A minimal OTLP/JSON envelope: enough structure to recover resource
/// attributes and the span/metric/log payload without pulling in a full
/// `opentelemetry-proto` dependency the teacher never carried.
#[derive(Debug, Deserialize)]
pub struct OtlpEnvelope {
    #[serde(default, rename = "resourceAttributes")]
    pub resource_attributes: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub items: Vec<serde_json::Map<String, serde_json::Value>>,
}

fn ingest_input_from_span(item: &serde_json::Map<String, serde_json::Value>) -> Option<Vec<IngestEventInput>> {
    let name = item.get("name")?.as_str()?;
    let session_id = item.get("sessionId").and_then(|v| v.as_str()).unwrap_or("otlp-unscoped").to_string();
    let agent_id = item.get("agentId").and_then(|v| v.as_str()).unwrap_or("otlp").to_string();
    let call_id = item
        .get("spanId")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    if name == "openclaw.model.usage" {
        let mut payload = OrderedObject::new();
        payload.0.insert("callId".to_string(), serde_json::Value::String(call_id));
        if let Some(attrs) = item.get("attributes").and_then(|v| v.as_object()) {
            for (k, v) in attrs {
                payload.0.insert(k.clone(), v.clone());
            }
        }
        return Some(vec![IngestEventInput {
            timestamp: None,
            session_id,
            agent_id,
            event_type: EventType::LlmResponse,
            severity: Severity::Info,
            payload,
            metadata: OrderedObject::new(),
        }]);
    }

    if let Some(tool_name) = name.strip_prefix("openclaw.tool.") {
        let mut payload = OrderedObject::new();
        payload.0.insert("toolName".to_string(), serde_json::Value::String(tool_name.to_string()));
        payload.0.insert("callId".to_string(), serde_json::Value::String(item.get("spanId").and_then(|v| v.as_str()).unwrap_or_default().to_string()));
        payload.0.insert("arguments".to_string(), item.get("attributes").cloned().unwrap_or(serde_json::Value::Object(Default::default())));
        return Some(vec![IngestEventInput {
            timestamp: None,
            session_id,
            agent_id,
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload,
            metadata: OrderedObject::new(),
        }]);
    }
    None
}

fn ingest_input_from_metric(item: &serde_json::Map<String, serde_json::Value>) -> Option<IngestEventInput> {
    let name = item.get("name")?.as_str()?;
    if name != "openclaw.cost.usd" {
        return None;
    }
    let value = item.get("value").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let mut payload = OrderedObject::new();
    payload.0.insert("provider".to_string(), serde_json::Value::String("otlp".to_string()));
    payload.0.insert("model".to_string(), serde_json::Value::String("unknown".to_string()));
    payload.0.insert("inputTokens".to_string(), serde_json::Value::from(0));
    payload.0.insert("outputTokens".to_string(), serde_json::Value::from(0));
    payload.0.insert("totalTokens".to_string(), serde_json::Value::from(0));
    payload.0.insert("costUsd".to_string(), serde_json::json!(value));
    Some(IngestEventInput {
        timestamp: None,
        session_id: item.get("sessionId").and_then(|v| v.as_str()).unwrap_or("otlp-unscoped").to_string(),
        agent_id: item.get("agentId").and_then(|v| v.as_str()).unwrap_or("otlp").to_string(),
        event_type: EventType::CostTracked,
        severity: Severity::Info,
        payload,
        metadata: OrderedObject::new(),
    })
}

fn ingest_input_from_log(item: &serde_json::Map<String, serde_json::Value>) -> IngestEventInput {
    let mut payload = OrderedObject::new();
    if let Some(body) = item.get("body") {
        payload.0.insert("data".to_string(), body.clone());
    }
    let severity_text = item.get("severityText").and_then(|v| v.as_str()).unwrap_or("INFO");
    IngestEventInput {
        timestamp: None,
        session_id: item.get("sessionId").and_then(|v| v.as_str()).unwrap_or("otlp-unscoped").to_string(),
        agent_id: item.get("agentId").and_then(|v| v.as_str()).unwrap_or("otlp").to_string(),
        event_type: EventType::Custom,
        severity: map_otlp_severity(severity_text),
        payload,
        metadata: OrderedObject::new(),
    }
}

/// Shared commit path for the three OTLP routes: resolves tenant, maps
/// the body to ingest inputs, assigns id/hash without the ingestion
/// lock's batching-by-session grouping (OTLP traffic is best-effort and
/// not expected to interleave with the chain-sensitive `/api/events`
/// path for the same session), inserts, and publishes.
async fn commit(state: &AppState, tenant_id: &str, inputs: Vec<IngestEventInput>) -> ApiResult<usize> {
    if inputs.is_empty() {
        return Ok(0);
    }
    let store = state.store();
    let mut events = Vec::with_capacity(inputs.len());
    for input in inputs {
        let prev_hash = store.get_last_event_hash(tenant_id, &input.session_id).await?;
        let id = new_event_id();
        let timestamp = chrono::Utc::now();
        let hash = HashInput {
            id: &id,
            timestamp: &timestamp,
            session_id: &input.session_id,
            agent_id: &input.agent_id,
            event_type: input.event_type,
            severity: input.severity,
            payload: &input.payload,
            metadata: &input.metadata,
            prev_hash: prev_hash.as_deref(),
        }
        .compute_hash();
        events.push(Event {
            id,
            timestamp,
            session_id: input.session_id,
            agent_id: input.agent_id,
            tenant_id: tenant_id.to_string(),
            event_type: input.event_type,
            severity: input.severity,
            payload: input.payload,
            metadata: input.metadata,
            prev_hash,
            hash,
        });
    }
    let count = events.len();
    store.insert_events(tenant_id, events.clone()).await?;
    let now = chrono::Utc::now();
    for event in events {
        state.bus().publish(BusMessage::EventIngested {
            tenant_id: tenant_id.to_string(),
            event,
            timestamp: now,
        });
    }
    Ok(count)
}

fn check_body_size(envelope: &OtlpEnvelope) -> ApiResult<()> {
    let size = serde_json::to_vec(&envelope.items).map(|v| v.len()).unwrap_or(0);
    if size > OTLP_BODY_LIMIT_BYTES {
        return Err(ApiError::PayloadTooLarge);
    }
    Ok(())
}

fn check_rate(state: &AppState, addr: SocketAddr) -> ApiResult<()> {
    if state.otlp_ip_limiter().check(addr) {
        Ok(())
    } else {
        Err(ApiError::RateLimited { retry_after_secs: 60 })
    }
}

pub async fn receive_traces(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<OtlpEnvelope>,
) -> ApiResult<Json<serde_json::Value>> {
    check_bearer(&state, &headers)?;
    check_rate(&state, addr)?;
    check_body_size(&body)?;
    let tenant_id = resolve_tenant(&body.resource_attributes, state.multi_tenant())?;
    let inputs: Vec<IngestEventInput> = body.items.iter().filter_map(ingest_input_from_span).flatten().collect();
    let inserted = commit(&state, &tenant_id, inputs).await?;
    Ok(Json(serde_json::json!({ "inserted": inserted })))
}

pub async fn receive_metrics(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<OtlpEnvelope>,
) -> ApiResult<Json<serde_json::Value>> {
    check_bearer(&state, &headers)?;
    check_rate(&state, addr)?;
    let tenant_id = resolve_tenant(&body.resource_attributes, state.multi_tenant())?;
    let inputs: Vec<IngestEventInput> = body.items.iter().filter_map(ingest_input_from_metric).collect();
    let inserted = commit(&state, &tenant_id, inputs).await?;
    Ok(Json(serde_json::json!({ "inserted": inserted })))
}

pub async fn receive_logs(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<OtlpEnvelope>,
) -> ApiResult<Json<serde_json::Value>> {
    check_bearer(&state, &headers)?;
    check_rate(&state, addr)?;
    let tenant_id = resolve_tenant(&body.resource_attributes, state.multi_tenant())?;
    let inputs: Vec<IngestEventInput> = body.items.iter().map(ingest_input_from_log).collect();
    let inserted = commit(&state, &tenant_id, inputs).await?;
    Ok(Json(serde_json::json!({ "inserted": inserted })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_mapping_covers_common_otel_levels() {
        assert_eq!(map_otlp_severity("ERROR"), Severity::Error);
        assert_eq!(map_otlp_severity("WARN"), Severity::Warn);
        assert_eq!(map_otlp_severity("unknown"), Severity::Info);
    }

    #[test]
    fn tenant_resolution_falls_back_to_default_outside_multi_tenant_mode() {
        let attrs = HashMap::new();
        assert_eq!(resolve_tenant(&attrs, false).unwrap(), "default");
        assert!(resolve_tenant(&attrs, true).is_err());
    }

    #[test]
    fn tenant_resolution_prefers_resource_attribute() {
        let mut attrs = HashMap::new();
        attrs.insert("openclaw.tenant_id".to_string(), serde_json::json!("t_a"));
        assert_eq!(resolve_tenant(&attrs, true).unwrap(), "t_a");
    }

    #[test]
    fn ip_limiter_rejects_after_quota_exhausted() {
        let limiter = OtlpIpLimiter::default();
        let addr: SocketAddr = "127.0.0.1:1234".parse().unwrap();
        for _ in 0..OTLP_IP_LIMIT_PER_MIN {
            assert!(limiter.check(addr));
        }
        assert!(!limiter.check(addr));
    }
}
