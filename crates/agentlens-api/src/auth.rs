//! Bearer API-key authentication, grounded on `vex-api::auth` but
//! replacing JWT claims with `agentlens_store::api_key` lookups: keys
//! carry `{tenant_id, scopes}` directly (spec §6) rather than encoding
//! them into a signed token.

use agentlens_store::{validate_api_key, ApiKeyStore, Scope};
use std::sync::Arc;

use crate::error::ApiError;

/// Resolved identity for one authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub key_id: uuid::Uuid,
    pub tenant_id: String,
    pub scopes: Vec<Scope>,
}

impl AuthContext {
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.iter().any(|s| *s == scope || *s == Scope::All)
    }
}

/// Extracts a bearer token from `Authorization: Bearer <key>` and
/// resolves it against `store`.
pub async fn authenticate(
    store: &Arc<dyn ApiKeyStore>,
    authorization_header: Option<&str>,
) -> Result<AuthContext, ApiError> {
    let header = authorization_header.ok_or_else(|| ApiError::Auth("missing Authorization header".to_string()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Auth("Authorization header must use the Bearer scheme".to_string()))?;

    let record = validate_api_key(store.as_ref(), token)
        .await
        .map_err(|e| ApiError::Auth(e.to_string()))?;

    Ok(AuthContext {
        key_id: record.id,
        tenant_id: record.tenant_id,
        scopes: record.scopes,
    })
}

/// Role-to-scope mapping for key issuance (spec §6): viewer=read,
/// member=read+write, admin=*, auditor=read+audit.
pub fn scopes_for_role(role: &str) -> Option<Vec<Scope>> {
    match role {
        "viewer" => Some(vec![Scope::Read]),
        "member" => Some(vec![Scope::Read, Scope::Write]),
        "admin" => Some(vec![Scope::All]),
        "auditor" => Some(vec![Scope::Read, Scope::Audit]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlens_store::{ApiKeyRecord, MemoryApiKeyStore};

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let store: Arc<dyn ApiKeyStore> = Arc::new(MemoryApiKeyStore::new());
        let result = authenticate(&store, None).await;
        assert!(matches!(result, Err(ApiError::Auth(_))));
    }

    #[tokio::test]
    async fn valid_bearer_token_resolves_tenant_and_scopes() {
        let api_keys = MemoryApiKeyStore::new();
        let (record, plaintext) = ApiKeyRecord::new("t_a", "ci key", vec![Scope::Read, Scope::Write], None);
        api_keys.create(&record).await.unwrap();
        let store: Arc<dyn ApiKeyStore> = Arc::new(api_keys);

        let header = format!("Bearer {plaintext}");
        let ctx = authenticate(&store, Some(&header)).await.unwrap();
        assert_eq!(ctx.tenant_id, "t_a");
        assert!(ctx.has_scope(Scope::Write));
        assert!(!ctx.has_scope(Scope::Audit));
    }

    #[test]
    fn role_mapping_matches_spec_table() {
        assert_eq!(scopes_for_role("viewer"), Some(vec![Scope::Read]));
        assert_eq!(scopes_for_role("member"), Some(vec![Scope::Read, Scope::Write]));
        assert_eq!(scopes_for_role("admin"), Some(vec![Scope::All]));
        assert_eq!(scopes_for_role("auditor"), Some(vec![Scope::Read, Scope::Audit]));
        assert_eq!(scopes_for_role("bogus"), None);
    }
}
