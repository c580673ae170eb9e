//! The canonical event record and its closed payload taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The 18-member closed event-type taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStarted,
    SessionEnded,
    ToolCall,
    ToolResponse,
    ToolError,
    ApprovalRequested,
    ApprovalGranted,
    ApprovalDenied,
    ApprovalExpired,
    FormSubmitted,
    FormCompleted,
    FormExpired,
    CostTracked,
    LlmCall,
    LlmResponse,
    AlertTriggered,
    AlertResolved,
    Custom,
}

impl EventType {
    pub const ALL: [EventType; 18] = [
        EventType::SessionStarted,
        EventType::SessionEnded,
        EventType::ToolCall,
        EventType::ToolResponse,
        EventType::ToolError,
        EventType::ApprovalRequested,
        EventType::ApprovalGranted,
        EventType::ApprovalDenied,
        EventType::ApprovalExpired,
        EventType::FormSubmitted,
        EventType::FormCompleted,
        EventType::FormExpired,
        EventType::CostTracked,
        EventType::LlmCall,
        EventType::LlmResponse,
        EventType::AlertTriggered,
        EventType::AlertResolved,
        EventType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionStarted => "session_started",
            EventType::SessionEnded => "session_ended",
            EventType::ToolCall => "tool_call",
            EventType::ToolResponse => "tool_response",
            EventType::ToolError => "tool_error",
            EventType::ApprovalRequested => "approval_requested",
            EventType::ApprovalGranted => "approval_granted",
            EventType::ApprovalDenied => "approval_denied",
            EventType::ApprovalExpired => "approval_expired",
            EventType::FormSubmitted => "form_submitted",
            EventType::FormCompleted => "form_completed",
            EventType::FormExpired => "form_expired",
            EventType::CostTracked => "cost_tracked",
            EventType::LlmCall => "llm_call",
            EventType::LlmResponse => "llm_response",
            EventType::AlertTriggered => "alert_triggered",
            EventType::AlertResolved => "alert_resolved",
            EventType::Custom => "custom",
        }
    }

    /// Required payload fields for this event type, per spec §3.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            EventType::ToolCall => &["toolName", "callId", "arguments"],
            EventType::ToolResponse | EventType::ToolError => &["callId"],
            EventType::CostTracked => &[
                "provider",
                "model",
                "inputTokens",
                "outputTokens",
                "totalTokens",
                "costUsd",
            ],
            EventType::LlmCall | EventType::LlmResponse => &["callId"],
            EventType::ApprovalRequested
            | EventType::ApprovalGranted
            | EventType::ApprovalDenied
            | EventType::ApprovalExpired => &["requestId"],
            EventType::FormSubmitted | EventType::FormCompleted | EventType::FormExpired => {
                &["submissionId"]
            }
            _ => &[],
        }
    }
}

/// Severity, ordered debug < info < warn < error < critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

/// An order-preserving JSON object. `payload` and `metadata` are both this
/// type because the hash is content-addressed over the producer's field
/// order (spec §4.1) — `serde_json`'s `preserve_order` feature backs the
/// underlying map so insertion order survives round trips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct OrderedObject(pub Map<String, Value>);

impl OrderedObject {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn has_required(&self, fields: &[&str]) -> Result<(), String> {
        for f in fields {
            if !self.0.contains_key(*f) {
                return Err(format!("missing required field `{f}`"));
            }
        }
        Ok(())
    }

    pub fn is_redacted(&self) -> bool {
        matches!(self.0.get("redacted"), Some(Value::Bool(true)))
    }

    pub fn call_id(&self) -> Option<&str> {
        self.0.get("callId").and_then(Value::as_str)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.0.get("requestId").and_then(Value::as_str)
    }

    pub fn submission_id(&self) -> Option<&str> {
        self.0.get("submissionId").and_then(Value::as_str)
    }

    pub fn cost_usd(&self) -> f64 {
        self.0
            .get("costUsd")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    /// Replace every message/content field with the fixed redaction
    /// literal, preserving numeric/identity metadata exactly (spec §4.4,
    /// P10). Applied on read, never persisted.
    pub fn redacted_view(&self) -> Self {
        const CONTENT_KEYS: [&str; 3] = ["messages", "completion", "content"];
        let mut out = self.0.clone();
        for key in CONTENT_KEYS {
            if let Some(v) = out.get_mut(key) {
                *v = redact_value(v);
            }
        }
        Self(out)
    }
}

fn redact_value(v: &Value) -> Value {
    match v {
        Value::String(_) => Value::String("[REDACTED]".to_string()),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(obj) => {
                        let mut obj = obj.clone();
                        if let Some(c) = obj.get_mut("content") {
                            *c = Value::String("[REDACTED]".to_string());
                        }
                        Value::Object(obj)
                    }
                    other => redact_value(other),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// The canonical, immutable event record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub session_id: String,
    pub agent_id: String,
    pub tenant_id: String,
    pub event_type: EventType,
    pub severity: Severity,
    pub payload: OrderedObject,
    pub metadata: OrderedObject,
    pub prev_hash: Option<String>,
    pub hash: String,
}

/// Producer-supplied fields for one event in an ingest batch. `id`,
/// `prevHash`, and `hash` are server-assigned (spec §4.3).
#[derive(Debug, Clone, Deserialize)]
pub struct IngestEventInput {
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub session_id: String,
    pub agent_id: String,
    pub event_type: EventType,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub payload: OrderedObject,
    #[serde(default)]
    pub metadata: OrderedObject,
}
