//! Replay builder (spec §4.4). Owns no state; a pure function over a
//! session header and its full timeline, as `vex-core`'s context/fitness
//! modules are pure transforms over data handed to them.

use crate::event::{Event, EventType, Severity};
use crate::hash::verify_chain;
use crate::session::Session;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub offset: usize,
    pub limit: usize,
    pub event_types: Option<HashSet<EventType>>,
    pub include_context: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 1000,
            event_types: None,
            include_context: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ReplaySummary {
    pub total_cost_usd: f64,
    pub total_duration_ms: i64,
    pub llm_call_count: u64,
    pub tool_call_count: u64,
    pub error_count: u64,
    pub models: BTreeSet<String>,
    pub tools: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct LlmHistoryEntry {
    pub call_id: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub messages: serde_json::Value,
    pub response: Option<serde_json::Value>,
    pub cost_usd: f64,
    pub latency_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ToolResultEntry {
    pub call_id: String,
    pub tool_name: Option<String>,
    pub completed: bool,
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct PendingApproval {
    pub request_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ReplayContext {
    pub event_index: usize,
    pub total_events: usize,
    pub cumulative_cost_usd: f64,
    pub elapsed_ms: i64,
    pub event_counts: BTreeMap<String, u64>,
    pub llm_history: Vec<LlmHistoryEntry>,
    pub tool_results: Vec<ToolResultEntry>,
    pub pending_approvals: Vec<PendingApproval>,
    pub error_count: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayStep {
    pub event: Event,
    pub paired_event: Option<Event>,
    pub pair_duration_ms: Option<i64>,
    pub context: ReplayContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayState {
    pub session_id: String,
    pub chain_valid: bool,
    pub summary: ReplaySummary,
    pub steps: Vec<ReplayStep>,
    pub has_more: bool,
    pub total: usize,
}

fn apply_redaction(event: &Event) -> Event {
    if event.payload.is_redacted() {
        let mut e = event.clone();
        e.payload = e.payload.redacted_view();
        e
    } else {
        event.clone()
    }
}

/// Build a `ReplayState` from a session header and its full ascending
/// timeline. Returns `None` only when the caller should treat the
/// session as absent — callers are expected to have already checked
/// `session` existence against the store (spec §4.4 step 1).
pub fn build(session: &Session, timeline: &[Event], options: ReplayOptions) -> ReplayState {
    let chain_valid = verify_chain(timeline).valid;

    // Pairing maps: correlation id -> index of the completion event.
    let mut tool_pairs: BTreeMap<String, usize> = BTreeMap::new();
    let mut llm_pairs: BTreeMap<String, usize> = BTreeMap::new();
    let mut approval_pairs: BTreeMap<String, usize> = BTreeMap::new();
    let mut form_pairs: BTreeMap<String, usize> = BTreeMap::new();

    for (i, event) in timeline.iter().enumerate() {
        match event.event_type {
            EventType::ToolResponse | EventType::ToolError => {
                if let Some(id) = event.payload.call_id() {
                    tool_pairs.insert(id.to_string(), i);
                }
            }
            EventType::LlmResponse => {
                if let Some(id) = event.payload.call_id() {
                    llm_pairs.insert(id.to_string(), i);
                }
            }
            EventType::ApprovalGranted | EventType::ApprovalDenied | EventType::ApprovalExpired => {
                if let Some(id) = event.payload.request_id() {
                    approval_pairs.insert(id.to_string(), i);
                }
            }
            EventType::FormCompleted | EventType::FormExpired => {
                if let Some(id) = event.payload.submission_id() {
                    form_pairs.insert(id.to_string(), i);
                }
            }
            _ => {}
        }
    }

    let mut summary = ReplaySummary::default();
    if let (Some(first), Some(last)) = (timeline.first(), timeline.last()) {
        summary.total_duration_ms = (last.timestamp - first.timestamp).num_milliseconds();
    }
    for event in timeline {
        match event.event_type {
            EventType::LlmResponse | EventType::CostTracked => {
                summary.total_cost_usd += event.payload.cost_usd();
            }
            _ => {}
        }
        match event.event_type {
            EventType::LlmCall => {
                summary.llm_call_count += 1;
                if let Some(m) = event.payload.get("model").and_then(|v| v.as_str()) {
                    summary.models.insert(m.to_string());
                }
            }
            EventType::ToolCall => {
                summary.tool_call_count += 1;
                if let Some(t) = event.payload.get("toolName").and_then(|v| v.as_str()) {
                    summary.tools.insert(t.to_string());
                }
            }
            _ => {}
        }
        if matches!(event.event_type, EventType::ToolError)
            || matches!(event.severity, Severity::Error | Severity::Critical)
        {
            summary.error_count += 1;
        }
    }

    let first_ts = timeline.first().map(|e| e.timestamp);

    // The walk indices used for step emission (possibly filtered).
    let walk_indices: Vec<usize> = match &options.event_types {
        None => (0..timeline.len()).collect(),
        Some(types) => (0..timeline.len())
            .filter(|&i| types.contains(&timeline[i].event_type))
            .collect(),
    };
    let filtered_total = walk_indices.len();

    let mut ctx = ReplayContext::default();
    ctx.total_events = filtered_total;
    let mut steps = Vec::new();

    for (step_number, &i) in walk_indices.iter().enumerate() {
        let event = &timeline[i];

        if options.include_context {
            ctx.event_index = step_number + 1;
            ctx.elapsed_ms = first_ts
                .map(|f| (event.timestamp - f).num_milliseconds())
                .unwrap_or(0);
            *ctx.event_counts.entry(event.event_type.as_str().to_string()).or_insert(0) += 1;

            match event.event_type {
                EventType::LlmCall => {
                    ctx.llm_history.push(LlmHistoryEntry {
                        call_id: event.payload.call_id().unwrap_or_default().to_string(),
                        provider: event.payload.get("provider").and_then(|v| v.as_str()).map(str::to_string),
                        model: event.payload.get("model").and_then(|v| v.as_str()).map(str::to_string),
                        messages: serde_json::Value::Object(apply_redaction(event).payload.0),
                        response: None,
                        cost_usd: 0.0,
                        latency_ms: None,
                    });
                }
                EventType::LlmResponse => {
                    ctx.cumulative_cost_usd += event.payload.cost_usd();
                    if let Some(id) = event.payload.call_id() {
                        if let Some(entry) = ctx.llm_history.iter_mut().find(|e| e.call_id == id) {
                            entry.cost_usd = event.payload.cost_usd();
                            entry.latency_ms = event.payload.get("latencyMs").and_then(|v| v.as_i64());
                            entry.response = Some(serde_json::Value::Object(apply_redaction(event).payload.0));
                        }
                    }
                }
                EventType::CostTracked => {
                    ctx.cumulative_cost_usd += event.payload.cost_usd();
                }
                EventType::ToolCall => {
                    ctx.tool_results.push(ToolResultEntry {
                        call_id: event.payload.call_id().unwrap_or_default().to_string(),
                        tool_name: event.payload.get("toolName").and_then(|v| v.as_str()).map(str::to_string),
                        completed: false,
                        result: None,
                    });
                }
                EventType::ToolResponse | EventType::ToolError => {
                    if let Some(id) = event.payload.call_id() {
                        if let Some(entry) = ctx.tool_results.iter_mut().find(|e| e.call_id == id) {
                            entry.completed = true;
                            entry.result = Some(serde_json::Value::Object(event.payload.0.clone()));
                        }
                    }
                }
                EventType::ApprovalRequested => {
                    ctx.pending_approvals.push(PendingApproval {
                        request_id: event.payload.request_id().unwrap_or_default().to_string(),
                        status: "pending".to_string(),
                    });
                }
                EventType::ApprovalGranted | EventType::ApprovalDenied | EventType::ApprovalExpired => {
                    if let Some(id) = event.payload.request_id() {
                        if let Some(entry) = ctx.pending_approvals.iter_mut().find(|e| e.request_id == id) {
                            entry.status = match event.event_type {
                                EventType::ApprovalGranted => "granted",
                                EventType::ApprovalDenied => "denied",
                                _ => "expired",
                            }
                            .to_string();
                        }
                    }
                }
                _ => {}
            }

            if matches!(event.event_type, EventType::ToolError)
                || matches!(event.severity, Severity::Error | Severity::Critical)
            {
                ctx.error_count += 1;
            }
            if event.payload.cost_usd() > 1.0 {
                ctx.warnings.push(format!("high cost event at {}", event.id));
            }
        }

        let (paired_event, pair_duration_ms) = match event.event_type {
            EventType::ToolCall => event
                .payload
                .call_id()
                .and_then(|id| tool_pairs.get(id))
                .map(|&end| (timeline[end].clone(), (timeline[end].timestamp - event.timestamp).num_milliseconds())),
            EventType::LlmCall => event
                .payload
                .call_id()
                .and_then(|id| llm_pairs.get(id))
                .map(|&end| (timeline[end].clone(), (timeline[end].timestamp - event.timestamp).num_milliseconds())),
            EventType::ApprovalRequested => event
                .payload
                .request_id()
                .and_then(|id| approval_pairs.get(id))
                .map(|&end| (timeline[end].clone(), (timeline[end].timestamp - event.timestamp).num_milliseconds())),
            EventType::FormSubmitted => event
                .payload
                .submission_id()
                .and_then(|id| form_pairs.get(id))
                .map(|&end| (timeline[end].clone(), (timeline[end].timestamp - event.timestamp).num_milliseconds())),
            _ => None,
        }
        .map(|(e, d)| (Some(apply_redaction(&e)), Some(d)))
        .unwrap_or((None, None));

        if step_number >= options.offset && step_number < options.offset + options.limit {
            steps.push(ReplayStep {
                event: apply_redaction(event),
                paired_event,
                pair_duration_ms,
                context: ctx.clone(),
            });
        }
    }

    let has_more = options.offset + options.limit < filtered_total;

    ReplayState {
        session_id: session.id.clone(),
        chain_valid,
        summary,
        steps,
        has_more,
        total: filtered_total,
    }
}
