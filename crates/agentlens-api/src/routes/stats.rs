//! `/api/stats`, `/api/stats/overview`, `/api/analytics` (spec §6): plain
//! aggregate reads through the tenant-scoped store, no new grounding
//! beyond the `scoped()` helper in [`super::query`].

use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use agentlens_store::{AnalyticsBucket, AnalyticsQuery, EventCounts, EventFilter, Granularity, TenantStats};

use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn scoped(state: &AppState, auth: &AuthContext) -> agentlens_store::TenantScopedStore {
    agentlens_store::TenantScopedStore::new(state.store(), auth.tenant_id.clone())
}

pub async fn get_stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<TenantStats>> {
    let store = scoped(&state, &auth);
    Ok(Json(store.get_stats().await?))
}

/// `overview` reuses the same `TenantStats` plus a simple error-count
/// breakdown over the whole history, computed with an unbounded filter.
#[derive(Debug, serde::Serialize)]
pub struct OverviewResponse {
    pub stats: TenantStats,
    pub counts: EventCounts,
}

pub async fn get_stats_overview(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<OverviewResponse>> {
    let store = scoped(&state, &auth);
    let stats = store.get_stats().await?;
    let counts = store.count_events_batch(&EventFilter::new()).await?;
    Ok(Json(OverviewResponse { stats, counts }))
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsRequest {
    pub from: chrono::DateTime<chrono::Utc>,
    pub to: chrono::DateTime<chrono::Utc>,
    pub granularity: Option<String>,
    pub agent_id: Option<String>,
}

fn parse_granularity(s: &str) -> Result<Granularity, String> {
    match s {
        "hour" => Ok(Granularity::Hour),
        "day" => Ok(Granularity::Day),
        other => Err(format!("unknown granularity `{other}`")),
    }
}

pub async fn get_analytics(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    axum::extract::Query(request): axum::extract::Query<AnalyticsRequest>,
) -> ApiResult<Json<Vec<AnalyticsBucket>>> {
    if request.to < request.from {
        return Err(ApiError::Validation("`to` must not precede `from`".to_string()));
    }
    let granularity = match request.granularity {
        Some(g) => parse_granularity(&g).map_err(ApiError::Validation)?,
        None => Granularity::Hour,
    };
    let query = AnalyticsQuery {
        from: request.from,
        to: request.to,
        granularity,
        agent_id: request.agent_id,
    };
    let store = scoped(&state, &auth);
    Ok(Json(store.get_analytics(&query).await?))
}
