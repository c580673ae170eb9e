//! Process bootstrap: env-driven config, router assembly with the
//! middleware stack, and graceful shutdown. Grounded on
//! `vex-api::server::{ServerConfig, VexServer, init_tracing,
//! shutdown_signal}`, with the manual TLS/hyper accept loop dropped —
//! TLS termination for AgentLens is expected to sit in front of the
//! process (a load balancer or reverse proxy), matching the plain
//! `axum::serve` path the teacher itself falls back to outside
//! `VEX_ENFORCE_HTTPS` (see `DESIGN.md`).

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;

use crate::middleware::{
    auth_middleware, body_limit_layer, cors_layer, request_id_middleware, security_headers_middleware,
    timeout_layer, tracing_middleware,
};
use crate::routes::api_router;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub database_url: String,
    pub request_timeout: Duration,
    pub max_body_size_bytes: usize,
    pub rate_limit_default_tier: agentlens_core::retention::PlanTier,
    pub compliance_signing_key: Option<Vec<u8>>,
    pub otlp_bearer_token: Option<String>,
    pub retention_warning_days: i64,
    pub multi_tenant: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".parse().unwrap(),
            database_url: "sqlite::memory:".to_string(),
            request_timeout: Duration::from_secs(30),
            max_body_size_bytes: 1024 * 1024,
            rate_limit_default_tier: agentlens_core::retention::PlanTier::Free,
            compliance_signing_key: None,
            otlp_bearer_token: None,
            retention_warning_days: 7,
            multi_tenant: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        let host = std::env::var("ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);
        let addr = format!("{host}:{port}").parse().unwrap_or(default.addr);

        let request_timeout = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(default.request_timeout);

        let max_body_size_bytes = std::env::var("MAX_BODY_SIZE_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.max_body_size_bytes);

        let rate_limit_default_tier = std::env::var("RATE_LIMIT_DEFAULT_TIER")
            .ok()
            .and_then(|v| match v.as_str() {
                "free" => Some(agentlens_core::retention::PlanTier::Free),
                "pro" => Some(agentlens_core::retention::PlanTier::Pro),
                "team" => Some(agentlens_core::retention::PlanTier::Team),
                "enterprise" => Some(agentlens_core::retention::PlanTier::Enterprise),
                _ => None,
            })
            .unwrap_or(default.rate_limit_default_tier);

        let compliance_signing_key = std::env::var("COMPLIANCE_SIGNING_KEY").ok().map(|s| s.into_bytes());
        let otlp_bearer_token = std::env::var("OTLP_BEARER_TOKEN").ok();
        let retention_warning_days = std::env::var("RETENTION_WARNING_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default.retention_warning_days);
        let multi_tenant = std::env::var("AGENTLENS_MULTI_TENANT").is_ok();

        Self {
            addr,
            database_url: std::env::var("DATABASE_URL").unwrap_or(default.database_url),
            request_timeout,
            max_body_size_bytes,
            rate_limit_default_tier,
            compliance_signing_key,
            otlp_bearer_token,
            retention_warning_days,
            multi_tenant,
        }
    }
}

pub struct ServerHandle {
    config: ServerConfig,
    state: AppState,
}

impl ServerHandle {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Layer order mirrors `vex-api::server::VexServer::router`: outermost
    /// (compression/body-limit/timeout/CORS) runs first on the request,
    /// auth runs innermost so every other layer has already applied.
    pub fn router(&self) -> Router {
        api_router(self.state.clone())
            .layer(body_limit_layer(self.config.max_body_size_bytes))
            .layer(timeout_layer(self.config.request_timeout))
            .layer(cors_layer())
            .layer(middleware::from_fn(security_headers_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(middleware::from_fn_with_state(self.state.clone(), tracing_middleware))
            .layer(middleware::from_fn_with_state(self.state.clone(), auth_middleware))
    }

    pub async fn run(self) -> Result<(), std::io::Error> {
        let addr = self.config.addr;
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "agentlens-api listening");
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,agentlens_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_listens_on_8080() {
        assert_eq!(ServerConfig::default().addr.port(), 8080);
    }
}
