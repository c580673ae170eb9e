pub mod export;
pub mod import;
pub mod info;
pub mod keys;
pub mod retention;
pub mod verify;

use agentlens_store::{ApiKeyStore, EventStore, SqliteApiKeyStore, SqliteStore};
use anyhow::{Context, Result};
use std::sync::Arc;

const DEFAULT_DATABASE_URL: &str = "sqlite:agentlens.db?mode=rwc";

fn resolve_url(database_url: &Option<String>) -> String {
    database_url.clone().unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

/// Opens a SQLite-backed store at `database_url`, defaulting to a local
/// `agentlens.db` file so commands work out of the box against the same
/// database the server writes to.
pub async fn open_store(database_url: &Option<String>) -> Result<Arc<dyn EventStore>> {
    let url = resolve_url(database_url);
    let store = SqliteStore::new(&url)
        .await
        .with_context(|| format!("failed to open store at {url}"))?;
    Ok(Arc::new(store))
}

/// Opens the API key store over the same database the event store uses,
/// so `agentlens keys issue` writes to the database the running server
/// reads from.
pub async fn open_api_keys(database_url: &Option<String>) -> Result<Arc<dyn ApiKeyStore>> {
    let url = resolve_url(database_url);
    let store = SqliteStore::new(&url)
        .await
        .with_context(|| format!("failed to open store at {url}"))?;
    Ok(Arc::new(SqliteApiKeyStore::new(store.pool().clone())))
}
