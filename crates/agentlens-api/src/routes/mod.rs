//! Route modules and the assembled router, grounded on
//! `vex-api::routes::api_router`'s `SwaggerUi::merge` + `.with_state`
//! shape.

pub mod compliance;
pub mod config;
pub mod health;
pub mod ingest;
pub mod otlp;
pub mod query;
pub mod stats;
pub mod stream;

use axum::{
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(health::health), components(schemas(health::HealthResponse)))]
pub struct ApiDoc;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health::health))
        .route("/api/events", post(ingest::ingest_events).get(query::list_events))
        .route("/api/events/{id}", get(query::get_event))
        .route("/api/sessions", get(query::list_sessions))
        .route("/api/sessions/{id}", get(query::get_session))
        .route("/api/sessions/{id}/timeline", get(query::get_session_timeline))
        .route("/api/sessions/{id}/replay", get(query::get_session_replay))
        .route("/api/stream", get(stream::stream_events))
        .route("/api/stats", get(stats::get_stats))
        .route("/api/stats/overview", get(stats::get_stats_overview))
        .route("/api/analytics", get(stats::get_analytics))
        .route("/api/compliance/report", get(compliance::get_compliance_report))
        .route("/api/compliance/export/events", get(compliance::export_events))
        .route("/api/config", get(config::get_config).put(config::put_config))
        .route("/v1/traces", post(otlp::receive_traces))
        .route("/v1/metrics", post(otlp::receive_metrics))
        .route("/v1/logs", post(otlp::receive_logs))
        .with_state(state)
}
