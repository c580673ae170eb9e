//! `/api/compliance/report` and `/api/compliance/export/events` (spec
//! §4.7). Both require the `audit` capability; report generation writes
//! a `compliance_report_generated` audit-log entry. No teacher analog —
//! `vex-api` has no compliance surface — so this is built directly
//! against the spec over `agentlens_core::report` and the raw store
//! (range queries span the whole tenant, not one session, so this
//! bypasses `TenantScopedStore` the same way ingestion does).

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;

use agentlens_core::event::{EventType, Severity};
use agentlens_core::hash::verify_chain_batch;
use agentlens_core::report::{
    ApprovalStats, ChainVerificationSummary, ComplianceReport, CostUsage, HumanOversight, Incident,
    RetentionInfo, SystemInfo, validate_range,
};
use agentlens_core::retention::PlanTier;
use agentlens_store::{EventFilter, Order, Scope};

use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const REPORT_PAGE_SIZE: usize = 500;
const MAX_INCIDENTS: usize = 200;

fn require_audit(auth: &AuthContext) -> ApiResult<()> {
    if auth.has_scope(Scope::Audit) {
        Ok(())
    } else {
        Err(ApiError::Authorization("the `audit` scope is required".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
}

/// Pages through the tenant's events in the range, oldest first,
/// threading each page's last hash as the next page's `expectedPrevHash`
/// anchor (spec §4.7 "Chain verification"). Returns the combined
/// verification (with a tenant-wide event index rather than a
/// per-page one) plus every page visited, for the exporter and the
/// incident scan to share a single pass over the store.
async fn verify_range(
    state: &AppState,
    tenant_id: &str,
    from: chrono::DateTime<chrono::Utc>,
    to: chrono::DateTime<chrono::Utc>,
) -> ApiResult<(ChainVerificationSummary, Vec<agentlens_core::event::Event>)> {
    let mut all = Vec::new();
    let mut offset = 0usize;
    let mut anchor: Option<String> = None;
    let mut summary = ChainVerificationSummary {
        verified: true,
        total_events: 0,
        failed_at_index: None,
        reason: None,
    };

    loop {
        let filter = EventFilter {
            from: Some(from),
            to: Some(to),
            order: Order::Asc,
            limit: REPORT_PAGE_SIZE,
            offset,
            ..EventFilter::new()
        };
        let (page, _total) = state.store().query_events(tenant_id, &filter).await?;
        if page.is_empty() {
            break;
        }
        let page_len = page.len();
        let verification = verify_chain_batch(&page, anchor.as_deref());
        if !verification.valid {
            summary.verified = false;
            summary.failed_at_index = verification.failed_at_index.map(|i| i + offset);
            summary.reason = verification.reason;
            all.extend(page);
            summary.total_events = all.len() as u64;
            return Ok((summary, all));
        }
        anchor = page.last().map(|e| e.hash.clone());
        offset += page_len;
        all.extend(page);
        if page_len < REPORT_PAGE_SIZE {
            break;
        }
    }
    summary.total_events = all.len() as u64;
    Ok((summary, all))
}

fn build_incidents(events: &[agentlens_core::event::Event]) -> Vec<Incident> {
    events
        .iter()
        .filter(|e| {
            e.event_type == EventType::ToolError
                || e.event_type == EventType::AlertTriggered
                || matches!(e.severity, Severity::Error | Severity::Critical)
        })
        .take(MAX_INCIDENTS)
        .map(|e| Incident {
            event_id: e.id.clone(),
            timestamp: e.timestamp,
            session_id: e.session_id.clone(),
            agent_id: e.agent_id.clone(),
            kind: e.event_type.as_str().to_string(),
            detail: format!("{:?} severity event", e.severity),
        })
        .collect()
}

fn build_cost_usage(events: &[agentlens_core::event::Event]) -> CostUsage {
    let mut usage = CostUsage::default();
    for e in events {
        if matches!(e.event_type, EventType::LlmResponse | EventType::CostTracked) {
            let cost = e.payload.cost_usd();
            usage.total_usd += cost;
            *usage.by_agent.entry(e.agent_id.clone()).or_insert(0.0) += cost;
        }
    }
    usage
}

/// Approval outcomes are their own event types
/// (`approval_granted`/`approval_denied`/`approval_expired`); a request
/// is only counted once its outcome is known, with an optional
/// `responseTimeMs` carried in the outcome event's payload.
fn build_approval_stats(events: &[agentlens_core::event::Event]) -> ApprovalStats {
    let mut stats = ApprovalStats::default();
    let mut response_times = Vec::new();
    for e in events {
        match e.event_type {
            EventType::ApprovalGranted => stats.granted += 1,
            EventType::ApprovalDenied => stats.denied += 1,
            EventType::ApprovalExpired => stats.expired += 1,
            _ => continue,
        }
        stats.total += 1;
        if let Some(ms) = e.payload.0.get("responseTimeMs").and_then(|v| v.as_f64()) {
            response_times.push(ms);
        }
    }
    stats.avg_response_time_ms = if response_times.is_empty() {
        None
    } else {
        Some(response_times.iter().sum::<f64>() / response_times.len() as f64)
    };
    stats
}

pub async fn get_compliance_report(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    axum::extract::Query(range): axum::extract::Query<RangeQuery>,
) -> ApiResult<Json<ComplianceReport>> {
    require_audit(&auth)?;
    validate_range(range.from, range.to).map_err(ApiError::Validation)?;

    let (chain_verification, events) = verify_range(&state, &auth.tenant_id, range.from, range.to).await?;
    let incidents = build_incidents(&events);
    let cost_usage = build_cost_usage(&events);
    let approval_requests = build_approval_stats(&events);

    // TODO(agentlens): retention days should reflect the tenant's actual
    // plan tier once billing is wired in; report against the free-tier
    // default until then, same caveat as ingestion's rate-limit tier.
    let retention_days = PlanTier::Free.default_retention().event_days;
    let oldest_event = events.first().map(|e| e.timestamp);

    let report = ComplianceReport {
        version: 1,
        tenant_id: auth.tenant_id.clone(),
        from: range.from,
        to: range.to,
        system_info: SystemInfo {
            product_name: "AgentLens".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: chrono::Utc::now(),
        },
        chain_verification: chain_verification.clone(),
        human_oversight: HumanOversight { approval_requests },
        incidents,
        cost_usage,
        retention: RetentionInfo {
            chain_intact: chain_verification.verified,
            oldest_event,
            retention_days,
        },
        signature: None,
    }
    .sign(state.compliance_signing_key());

    state
        .store()
        .record_audit_log(
            &auth.tenant_id,
            "compliance_report_generated",
            serde_json::json!({
                "keyId": auth.key_id,
                "from": range.from,
                "to": range.to,
            }),
        )
        .await?;

    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// Quotes a CSV field per RFC-4180 when it contains a comma, quote, or
/// newline; doubles any internal quote.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn events_to_csv(events: &[agentlens_core::event::Event]) -> String {
    let mut out = String::from("\u{FEFF}");
    out.push_str("id,timestamp,sessionId,agentId,eventType,severity,hash,prevHash\n");
    for e in events {
        out.push_str(&csv_escape(&e.id));
        out.push(',');
        out.push_str(&e.timestamp.to_rfc3339());
        out.push(',');
        out.push_str(&csv_escape(&e.session_id));
        out.push(',');
        out.push_str(&csv_escape(&e.agent_id));
        out.push(',');
        out.push_str(e.event_type.as_str());
        out.push(',');
        out.push_str(&format!("{:?}", e.severity).to_lowercase());
        out.push(',');
        out.push_str(&csv_escape(&e.hash));
        out.push(',');
        out.push_str(&csv_escape(e.prev_hash.as_deref().unwrap_or("")));
        out.push('\n');
    }
    out
}

pub async fn export_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    axum::extract::Query(query): axum::extract::Query<ExportQuery>,
) -> ApiResult<Response> {
    require_audit(&auth)?;
    validate_range(query.from, query.to).map_err(ApiError::Validation)?;

    let (verification, events) = verify_range(&state, &auth.tenant_id, query.from, query.to).await?;

    let mut response = match query.format {
        ExportFormat::Json => Json(events).into_response(),
        ExportFormat::Csv => {
            let body = events_to_csv(&events);
            let mut response = (StatusCode::OK, body).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8"));
            response
        }
    };

    let header_value = if verification.verified {
        HeaderValue::from_static("verified")
    } else {
        HeaderValue::from_static("failed")
    };
    response.headers_mut().insert("X-Chain-Verification", header_value);

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_escape_quotes_fields_with_commas() {
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
