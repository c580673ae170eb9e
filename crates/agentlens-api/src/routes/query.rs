//! Query endpoints (spec §6): events, sessions, timeline, replay. Every
//! read goes through a `TenantScopedStore` built from the caller's
//! `AuthContext`, never the raw `EventStore`, per §4.2's tenant-scoping
//! discipline.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use agentlens_core::event::{Event, EventType, Severity};
use agentlens_core::hash::verify_chain;
use agentlens_core::session::{Session, SessionStatus};
use agentlens_store::{EventFilter, Order, SessionFilter, TenantScopedStore};

use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn scoped(state: &AppState, auth: &AuthContext) -> TenantScopedStore {
    TenantScopedStore::new(state.store(), auth.tenant_id.clone())
}

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub event_type: Option<String>,
    pub severity: Option<String>,
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
    pub search: Option<String>,
    pub order: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub(crate) fn parse_event_type(s: &str) -> Result<EventType, String> {
    EventType::ALL
        .iter()
        .find(|t| t.as_str() == s)
        .copied()
        .ok_or_else(|| format!("unknown eventType `{s}`"))
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    match s {
        "debug" => Ok(Severity::Debug),
        "info" => Ok(Severity::Info),
        "warn" => Ok(Severity::Warn),
        "error" => Ok(Severity::Error),
        "critical" => Ok(Severity::Critical),
        other => Err(format!("unknown severity `{other}`")),
    }
}

impl EventQuery {
    fn into_filter(self) -> ApiResult<EventFilter> {
        let mut filter = EventFilter::new();
        filter.session_id = self.session_id;
        filter.agent_id = self.agent_id;
        if let Some(t) = self.event_type {
            filter.event_types = Some(HashSet::from([parse_event_type(&t).map_err(ApiError::Validation)?]));
        }
        if let Some(s) = self.severity {
            filter.severities = Some(HashSet::from([parse_severity(&s).map_err(ApiError::Validation)?]));
        }
        filter.from = self.from;
        filter.to = self.to;
        filter.search = self.search;
        filter.order = match self.order.as_deref() {
            Some("asc") => Order::Asc,
            _ => Order::Desc,
        };
        filter.limit = self.limit.unwrap_or(100).min(1000);
        filter.offset = self.offset.unwrap_or(0);
        Ok(filter)
    }
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<Event>,
    pub total: u64,
    pub has_more: bool,
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<EventQuery>,
) -> ApiResult<Json<EventsResponse>> {
    let store = scoped(&state, &auth);
    let filter = query.into_filter()?;
    let (events, total) = store.query_events(&filter).await?;
    let has_more = (filter.offset as u64 + events.len() as u64) < total;
    Ok(Json(EventsResponse { events, total, has_more }))
}

pub async fn get_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Event>> {
    let store = scoped(&state, &auth);
    let event = store
        .get_event(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("event {id} not found")))?;
    Ok(Json(event))
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub agent_id: Option<String>,
    pub status: Option<String>,
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
    pub tags: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn parse_status(s: &str) -> Result<SessionStatus, String> {
    match s {
        "active" => Ok(SessionStatus::Active),
        "completed" => Ok(SessionStatus::Completed),
        "error" => Ok(SessionStatus::Error),
        other => Err(format!("unknown status `{other}`")),
    }
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<Session>,
    pub total: u64,
    pub has_more: bool,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<SessionQuery>,
) -> ApiResult<Json<SessionsResponse>> {
    let store = scoped(&state, &auth);
    let mut filter = SessionFilter::new();
    filter.agent_id = query.agent_id;
    if let Some(s) = query.status {
        filter.status = Some(parse_status(&s).map_err(ApiError::Validation)?);
    }
    filter.from = query.from;
    filter.to = query.to;
    filter.tags = query.tags.map(|t| t.split(',').map(str::to_string).collect());
    filter.limit = query.limit.unwrap_or(100).min(1000);
    filter.offset = query.offset.unwrap_or(0);

    let (sessions, total) = store.query_sessions(&filter).await?;
    let has_more = (filter.offset as u64 + sessions.len() as u64) < total;
    Ok(Json(SessionsResponse { sessions, total, has_more }))
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    let store = scoped(&state, &auth);
    let session = store
        .get_session(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {id} not found")))?;
    Ok(Json(session))
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub events: Vec<Event>,
    pub chain_valid: bool,
}

pub async fn get_session_timeline(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<TimelineResponse>> {
    let store = scoped(&state, &auth);
    let events = store.get_session_timeline(&id).await?;
    let chain_valid = verify_chain(&events).valid;
    Ok(Json(TimelineResponse { events, chain_valid }))
}

#[derive(Debug, Deserialize)]
pub struct ReplayQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub event_types: Option<String>,
    pub include_context: Option<bool>,
}

pub async fn get_session_replay(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Query(query): Query<ReplayQuery>,
) -> ApiResult<Json<agentlens_core::replay::ReplayState>> {
    let store = scoped(&state, &auth);
    let session = store
        .get_session(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {id} not found")))?;
    let timeline = store.get_session_timeline(&id).await?;

    let event_types = match query.event_types {
        Some(s) => Some(
            s.split(',')
                .map(|t| parse_event_type(t).map_err(ApiError::Validation))
                .collect::<Result<HashSet<_>, _>>()?,
        ),
        None => None,
    };

    let options = agentlens_core::replay::ReplayOptions {
        offset: query.offset.unwrap_or(0),
        limit: query.limit.unwrap_or(1000),
        event_types,
        include_context: query.include_context.unwrap_or(true),
    };

    let state_built = agentlens_core::build_replay(&session, &timeline, options);
    Ok(Json(state_built))
}
