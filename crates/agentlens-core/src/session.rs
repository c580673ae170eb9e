//! Materialized `Session` and `Agent` aggregates (spec §3).

use crate::event::{Event, EventType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub tenant_id: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: SessionStatus,
    pub event_count: u64,
    pub tool_call_count: u64,
    pub error_count: u64,
    pub llm_call_count: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_usd: f64,
    pub tags: Vec<String>,
}

impl Session {
    pub fn new(tenant_id: &str, id: &str, agent_id: &str, started_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            id: id.to_string(),
            agent_id: agent_id.to_string(),
            agent_name: None,
            tenant_id: tenant_id.to_string(),
            started_at,
            ended_at: None,
            status: SessionStatus::Active,
            event_count: 0,
            tool_call_count: 0,
            error_count: 0,
            llm_call_count: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cost_usd: 0.0,
            tags: Vec::new(),
        }
    }

    /// Apply one event's effect to this session's counters. Status is
    /// sticky-terminal once `completed`/`error` (spec §4.3, §9): later
    /// events still update counters but never revive the status.
    pub fn apply_event(&mut self, event: &Event) {
        self.event_count += 1;
        match event.event_type {
            EventType::ToolCall => self.tool_call_count += 1,
            EventType::LlmCall => self.llm_call_count += 1,
            EventType::CostTracked | EventType::LlmResponse => {
                self.total_cost_usd += event.payload.cost_usd();
                if let Some(v) = event.payload.get("inputTokens").and_then(|v| v.as_u64()) {
                    self.total_input_tokens += v;
                }
                if let Some(v) = event.payload.get("outputTokens").and_then(|v| v.as_u64()) {
                    self.total_output_tokens += v;
                }
            }
            EventType::SessionStarted => {
                if let Some(name) = event.payload.get("agentName").and_then(|v| v.as_str()) {
                    self.agent_name = Some(name.to_string());
                }
            }
            EventType::SessionEnded => {
                if self.status == SessionStatus::Active {
                    self.status = match event.payload.get("reason").and_then(|v| v.as_str()) {
                        Some("error") => SessionStatus::Error,
                        _ => SessionStatus::Completed,
                    };
                }
                self.ended_at = Some(event.timestamp);
            }
            _ => {}
        }
        if matches!(event.event_type, EventType::ToolError)
            || matches!(event.severity, crate::event::Severity::Error | crate::event::Severity::Critical)
        {
            self.error_count += 1;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub tenant_id: String,
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub first_seen_at: chrono::DateTime<chrono::Utc>,
    pub last_seen_at: chrono::DateTime<chrono::Utc>,
    pub session_count: u64,
}

impl Agent {
    pub fn new(tenant_id: &str, id: &str, name: &str, seen_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            first_seen_at: seen_at,
            last_seen_at: seen_at,
            session_count: 0,
        }
    }
}
