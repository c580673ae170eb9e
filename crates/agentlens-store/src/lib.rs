//! Tenant-aware persistence for event chains, sessions, agents, alerts,
//! and configuration, with a pluggable backend (in-memory for tests and
//! small deployments, SQLite for durable single-node operation).

pub mod api_key;
pub mod backend;
pub mod error;
pub mod export;
pub mod memory;
pub mod retention_job;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "sqlite")]
pub mod sqlite_api_key;
pub mod tenant;
pub mod types;

pub use api_key::{validate_api_key, ApiKeyRecord, ApiKeyStore, MemoryApiKeyStore, Scope};
pub use backend::EventStore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
#[cfg(feature = "sqlite")]
pub use sqlite_api_key::SqliteApiKeyStore;
pub use tenant::TenantScopedStore;
pub use types::{
    AlertHistory, AlertRule, AnalyticsBucket, AnalyticsQuery, ConfigEntry, EventCounts,
    EventFilter, Granularity, Order, SessionFilter, TenantStats,
};
