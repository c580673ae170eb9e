//! Standalone entry point for the AgentLens API, a thin wrapper around
//! `agentlens-api` that wires a real store/api-key backend and runs the
//! retention job alongside the HTTP listener. Grounded on
//! `vex-server::main`'s bootstrap shape, stripped of everything specific
//! to the teacher's LLM-provider and worker-queue plumbing (no model
//! inference or agent execution happens here).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use agentlens_api::{AppState, ServerConfig, ServerHandle};
use agentlens_api::bus::EventBus;
use agentlens_api::rate_limiter::IngestRateLimiter;
use agentlens_store::retention_job::{run_purge, TenantPlan};
use agentlens_store::{ApiKeyStore, EventStore, MemoryApiKeyStore, MemoryStore};

const RETENTION_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<()> {
    agentlens_api::server::init_tracing();

    let config = ServerConfig::from_env();
    tracing::info!(addr = %config.addr, database_url = %config.database_url, "starting agentlens-server");

    let (store, api_keys) = build_backends(&config.database_url).await?;
    let bus = EventBus::new();
    let rate_limiter = Arc::new(IngestRateLimiter::default());

    let state = AppState::new(
        store.clone(),
        api_keys,
        bus,
        rate_limiter,
        config.otlp_bearer_token.clone(),
        config.compliance_signing_key.clone(),
        config.multi_tenant,
    );

    spawn_retention_job(store, config.rate_limit_default_tier, config.retention_warning_days);

    let handle = ServerHandle::new(config, state);
    handle.run().await?;
    Ok(())
}

/// `sqlite::memory:` falls back to the in-process store and an
/// in-process API key table; any other `DATABASE_URL` is treated as a
/// SQLite connection string (spec §5: "a single-node deployment persists
/// through SQLite") and the two stores share one connection pool so API
/// keys persist across restarts the same way events do.
async fn build_backends(database_url: &str) -> Result<(Arc<dyn EventStore>, Arc<dyn ApiKeyStore>)> {
    if database_url == "sqlite::memory:" {
        tracing::warn!("DATABASE_URL is sqlite::memory: — events and API keys do not survive a restart");
        return Ok((Arc::new(MemoryStore::new()), Arc::new(MemoryApiKeyStore::new())));
    }
    let store = agentlens_store::SqliteStore::new(database_url)
        .await
        .map_err(|e| anyhow::anyhow!("store init failed: {e}"))?;
    let api_keys = agentlens_store::SqliteApiKeyStore::new(store.pool().clone());
    Ok((Arc::new(store), Arc::new(api_keys)))
}

/// Runs the retention purge on a fixed interval for every tenant the
/// store currently knows about (spec §4.6). There is no billing system
/// yet, so every tenant is purged under the server's configured default
/// tier; per-tenant overrides become possible once plan assignment
/// exists.
fn spawn_retention_job(store: Arc<dyn EventStore>, tier: agentlens_core::retention::PlanTier, warning_days: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(RETENTION_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let tenants = match store.list_tenants().await {
                Ok(tenants) => tenants,
                Err(e) => {
                    tracing::warn!(error = %e, "retention job: failed to list tenants, skipping this pass");
                    continue;
                }
            };
            let plans: Vec<TenantPlan> = tenants
                .into_iter()
                .map(|tenant_id| TenantPlan {
                    tenant_id,
                    tier,
                    event_days_override: None,
                    audit_log_days_override: None,
                })
                .collect();

            let policy = tier.default_retention();
            for plan in &plans {
                let approaching =
                    agentlens_store::retention_job::events_approaching_expiry(&store, &plan.tenant_id, &policy, warning_days)
                        .await;
                if approaching > 0 {
                    tracing::info!(tenant_id = %plan.tenant_id, approaching, "events approaching retention cutoff");
                }
            }

            let summary = run_purge(&store, &plans).await;
            for failed in summary.failed_tenants() {
                tracing::warn!(tenant_id = %failed.tenant_id, error = ?failed.error, "retention purge failed for tenant");
            }
        }
    });
}
