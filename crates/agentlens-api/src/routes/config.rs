//! `GET/PUT /api/config` (spec §6): tenant-scoped key/value overrides
//! for retention and webhook settings. Secrets are stored as SHA-256
//! hashes and never echoed back; `GET` substitutes a boolean `<key>Set`
//! flag for any secret entry.

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use agentlens_store::{ConfigEntry, Scope};

use crate::auth::AuthContext;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ConfigView {
    Plain { key: String, value: serde_json::Value },
    SecretFlag { key: String, set: bool },
}

pub async fn get_config(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<ConfigView>>> {
    if !auth.has_scope(Scope::Read) {
        return Err(ApiError::Authorization("the `read` scope is required".to_string()));
    }
    let store = agentlens_store::TenantScopedStore::new(state.store(), auth.tenant_id.clone());
    let entries = store.get_config().await?;
    let views = entries
        .into_iter()
        .map(|e| {
            if e.is_secret {
                ConfigView::SecretFlag { key: format!("{}Set", e.key), set: true }
            } else {
                ConfigView::Plain { key: e.key, value: e.value }
            }
        })
        .collect();
    Ok(Json(views))
}

#[derive(Debug, Deserialize)]
pub struct SetConfigRequest {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub is_secret: bool,
}

pub async fn put_config(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<SetConfigRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if !auth.has_scope(Scope::Manage) {
        return Err(ApiError::Authorization("the `manage` scope is required".to_string()));
    }
    if request.key.trim().is_empty() {
        return Err(ApiError::Validation("key must not be empty".to_string()));
    }

    let stored_value = if request.is_secret {
        let serialized = serde_json::to_vec(&request.value).map_err(|e| ApiError::Validation(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(&serialized);
        serde_json::Value::String(hex::encode(hasher.finalize()))
    } else {
        request.value
    };

    let store = agentlens_store::TenantScopedStore::new(state.store(), auth.tenant_id.clone());
    store
        .set_config(ConfigEntry {
            tenant_id: auth.tenant_id.clone(),
            key: request.key,
            value: stored_value,
            is_secret: request.is_secret,
        })
        .await?;

    Ok(Json(serde_json::json!({ "ok": true })))
}
