//! Canonical event serialization and the per-session hash chain.
//!
//! Grounded on `vex-core::audit::HashParams` / `compute_hash`, adapted to
//! the fixed top-level field order spec'd for AgentLens (which is
//! incompatible with RFC 8785 key-sorting, see `DESIGN.md`).

use crate::event::{Event, EventType, OrderedObject, Severity};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Version stamp embedded in every hash input; bump on any change to the
/// canonical encoding so old and new hashes are never silently compared.
pub const HASH_VERSION: u32 = 2;

/// The fields that go into the hash, in the exact order the spec fixes.
/// `id`, `timestamp`, `sessionId`, `agentId`, `eventType`, and `severity`
/// are passed as already-rendered values so both the structured path
/// (serializing `OrderedObject`s) and the raw path (pre-serialized JSON
/// strings for `payload`/`metadata`) can share this builder.
pub struct HashInput<'a> {
    pub id: &'a str,
    pub timestamp: &'a chrono::DateTime<chrono::Utc>,
    pub session_id: &'a str,
    pub agent_id: &'a str,
    pub event_type: EventType,
    pub severity: Severity,
    pub payload: &'a OrderedObject,
    pub metadata: &'a OrderedObject,
    pub prev_hash: Option<&'a str>,
}

impl<'a> HashInput<'a> {
    /// Build the canonical JSON value with the mandated field order.
    /// `serde_json`'s `preserve_order` feature keeps a `Map`'s insertion
    /// order through serialization, which is what makes this ordering
    /// part of the wire contract rather than an implementation detail.
    fn to_canonical_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("v".to_string(), Value::from(HASH_VERSION));
        map.insert("id".to_string(), Value::String(self.id.to_string()));
        map.insert(
            "timestamp".to_string(),
            Value::String(self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
        map.insert(
            "sessionId".to_string(),
            Value::String(self.session_id.to_string()),
        );
        map.insert(
            "agentId".to_string(),
            Value::String(self.agent_id.to_string()),
        );
        map.insert(
            "eventType".to_string(),
            Value::String(self.event_type.as_str().to_string()),
        );
        map.insert(
            "severity".to_string(),
            serde_json::to_value(self.severity).expect("severity always serializes"),
        );
        map.insert("payload".to_string(), Value::Object(self.payload.0.clone()));
        map.insert("metadata".to_string(), Value::Object(self.metadata.0.clone()));
        map.insert(
            "prevHash".to_string(),
            match self.prev_hash {
                Some(h) => Value::String(h.to_string()),
                None => Value::Null,
            },
        );
        Value::Object(map)
    }

    /// Structured hashing path: build the ordered value, serialize once.
    pub fn compute_hash(&self) -> String {
        let value = self.to_canonical_value();
        let bytes = serde_json::to_vec(&value).expect("canonical value always serializes");
        hex::encode(Sha256::digest(&bytes))
    }

    /// Raw/pre-serialized hashing path: the caller supplies already
    /// JSON-encoded `payload`/`metadata` strings (e.g. as read back
    /// verbatim from a store row) and this builds the same byte sequence
    /// via string templating, skipping a JSON parse. Spec §9/§4.1
    /// requires the two paths to be provably byte-identical for
    /// semantically equal input; see the `tests` module below.
    pub fn compute_hash_raw(&self, payload_json: &str, metadata_json: &str) -> String {
        let prev_hash_json = match self.prev_hash {
            Some(h) => format!("\"{h}\""),
            None => "null".to_string(),
        };
        let timestamp = self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let severity = serde_json::to_string(&self.severity).expect("severity always serializes");
        let s = format!(
            "{{\"v\":{v},\"id\":\"{id}\",\"timestamp\":\"{ts}\",\"sessionId\":\"{sid}\",\"agentId\":\"{aid}\",\"eventType\":\"{et}\",\"severity\":{sev},\"payload\":{payload},\"metadata\":{metadata},\"prevHash\":{prev}}}",
            v = HASH_VERSION,
            id = self.id,
            ts = timestamp,
            sid = self.session_id,
            aid = self.agent_id,
            et = self.event_type.as_str(),
            sev = severity,
            payload = payload_json,
            metadata = metadata_json,
            prev = prev_hash_json,
        );
        // Re-parse and re-serialize through the canonical value builder so
        // whitespace/formatting differences in the raw JSON fragments
        // don't cause a spurious mismatch with the structured path.
        let value: Value = serde_json::from_str(&s).expect("template always produces valid json");
        let bytes = serde_json::to_vec(&value).expect("canonical value always serializes");
        hex::encode(Sha256::digest(&bytes))
    }
}

impl Event {
    /// Recompute this event's hash from its stored fields (spec §4.1 P1).
    pub fn recompute_hash(&self) -> String {
        HashInput {
            id: &self.id,
            timestamp: &self.timestamp,
            session_id: &self.session_id,
            agent_id: &self.agent_id,
            event_type: self.event_type,
            severity: self.severity,
            payload: &self.payload,
            metadata: &self.metadata,
            prev_hash: self.prev_hash.as_deref(),
        }
        .compute_hash()
    }
}

/// Result of `verify_chain`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainVerification {
    pub valid: bool,
    pub failed_at_index: Option<usize>,
    pub reason: Option<String>,
}

impl ChainVerification {
    fn ok() -> Self {
        Self {
            valid: true,
            failed_at_index: None,
            reason: None,
        }
    }

    fn fail(index: usize, reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            failed_at_index: Some(index),
            reason: Some(reason.into()),
        }
    }
}

/// Verify a full, ordered event list as a single chain (spec §4.1).
/// An empty list is valid. Never panics — failures are reported, never
/// thrown (spec §4.1 "Failure model").
pub fn verify_chain(events: &[Event]) -> ChainVerification {
    if events.is_empty() {
        return ChainVerification::ok();
    }
    verify_chain_batch(events, None)
}

/// Streaming variant: the first event's `prevHash` must match the
/// caller-supplied anchor (possibly `None` for genesis). Used by the
/// compliance exporter to verify page-at-a-time (spec §4.1, §4.7).
pub fn verify_chain_batch(events: &[Event], expected_prev_hash: Option<&str>) -> ChainVerification {
    let mut expected_prev: Option<String> = expected_prev_hash.map(str::to_string);
    for (i, event) in events.iter().enumerate() {
        let recomputed = event.recompute_hash();
        if recomputed != event.hash {
            tracing::warn!(index = i, event_id = %event.id, "chain verification: hash mismatch");
            return ChainVerification::fail(
                i,
                format!("recomputed hash does not match stored hash for event {}", event.id),
            );
        }
        if event.prev_hash.as_deref() != expected_prev.as_deref() {
            tracing::warn!(index = i, event_id = %event.id, "chain verification: prevHash mismatch");
            return ChainVerification::fail(
                i,
                format!(
                    "prevHash mismatch at event {}: expected {:?}, found {:?}",
                    event.id, expected_prev, event.prev_hash
                ),
            );
        }
        expected_prev = Some(event.hash.clone());
    }
    ChainVerification::ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::OrderedObject;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_payload() -> OrderedObject {
        let mut map = Map::new();
        map.insert("toolName".into(), json!("search"));
        map.insert("callId".into(), json!("c1"));
        map.insert("arguments".into(), json!({"query": "rust"}));
        OrderedObject(map)
    }

    #[test]
    fn structured_and_raw_paths_agree() {
        let ts = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let payload = sample_payload();
        let metadata = OrderedObject::new();
        let input = HashInput {
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV",
            timestamp: &ts,
            session_id: "sess_1",
            agent_id: "agent_1",
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload: &payload,
            metadata: &metadata,
            prev_hash: None,
        };
        let structured = input.compute_hash();
        let payload_json = serde_json::to_string(&payload.0).unwrap();
        let metadata_json = serde_json::to_string(&metadata.0).unwrap();
        let raw = input.compute_hash_raw(&payload_json, &metadata_json);
        assert_eq!(structured, raw);
    }

    #[test]
    fn verify_chain_detects_tamper() {
        let ts = chrono::Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let payload = sample_payload();
        let metadata = OrderedObject::new();
        let hash0 = HashInput {
            id: "e0",
            timestamp: &ts,
            session_id: "sess_1",
            agent_id: "agent_1",
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload: &payload,
            metadata: &metadata,
            prev_hash: None,
        }
        .compute_hash();

        let e0 = Event {
            id: "e0".into(),
            timestamp: ts,
            session_id: "sess_1".into(),
            agent_id: "agent_1".into(),
            tenant_id: "t_a".into(),
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload,
            metadata,
            prev_hash: None,
            hash: hash0,
        };

        let result = verify_chain(std::slice::from_ref(&e0));
        assert!(result.valid);

        let mut tampered = e0.clone();
        tampered.severity = Severity::Critical;
        let result = verify_chain(std::slice::from_ref(&tampered));
        assert!(!result.valid);
        assert_eq!(result.failed_at_index, Some(0));
    }
}
