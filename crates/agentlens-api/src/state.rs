//! Application state, grounded on `vex-api::state::AppState`: centralizes
//! access to the store, the API-key registry, the event bus, and the
//! ingestion rate limiter.

use crate::bus::EventBus;
use crate::rate_limiter::IngestRateLimiter;
use crate::routes::ingest::SessionLocks;
use crate::routes::otlp::OtlpIpLimiter;
use agentlens_store::{ApiKeyStore, EventStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn EventStore>,
    api_keys: Arc<dyn ApiKeyStore>,
    bus: EventBus,
    rate_limiter: Arc<IngestRateLimiter>,
    session_locks: Arc<SessionLocks>,
    otlp_bearer_token: Option<Arc<str>>,
    otlp_ip_limiter: Arc<OtlpIpLimiter>,
    compliance_signing_key: Option<Arc<[u8]>>,
    multi_tenant: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EventStore>,
        api_keys: Arc<dyn ApiKeyStore>,
        bus: EventBus,
        rate_limiter: Arc<IngestRateLimiter>,
        otlp_bearer_token: Option<String>,
        compliance_signing_key: Option<Vec<u8>>,
        multi_tenant: bool,
    ) -> Self {
        Self {
            store,
            api_keys,
            bus,
            rate_limiter,
            session_locks: Arc::new(SessionLocks::default()),
            otlp_bearer_token: otlp_bearer_token.map(Arc::from),
            otlp_ip_limiter: Arc::new(OtlpIpLimiter::default()),
            compliance_signing_key: compliance_signing_key.map(Arc::from),
            multi_tenant,
        }
    }

    pub fn store(&self) -> Arc<dyn EventStore> {
        self.store.clone()
    }

    pub fn api_keys(&self) -> Arc<dyn ApiKeyStore> {
        self.api_keys.clone()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn rate_limiter(&self) -> Arc<IngestRateLimiter> {
        self.rate_limiter.clone()
    }

    pub fn session_locks(&self) -> Arc<SessionLocks> {
        self.session_locks.clone()
    }

    pub fn otlp_bearer_token(&self) -> Option<&str> {
        self.otlp_bearer_token.as_deref()
    }

    pub fn otlp_ip_limiter(&self) -> &OtlpIpLimiter {
        &self.otlp_ip_limiter
    }

    pub fn compliance_signing_key(&self) -> Option<&[u8]> {
        self.compliance_signing_key.as_deref()
    }

    pub fn multi_tenant(&self) -> bool {
        self.multi_tenant
    }
}
