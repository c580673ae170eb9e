//! API key issuance and validation, adapted from
//! `vex-persist::api_key_store`: same Argon2id-with-legacy-SHA-256-fallback
//! shape, re-keyed from per-user keys to per-tenant keys with a closed
//! scope enum instead of free-form scope strings (spec §6).

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiKeyError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("key not found")]
    NotFound,
    #[error("key expired")]
    Expired,
    #[error("key revoked")]
    Revoked,
    #[error("invalid key format")]
    InvalidFormat,
}

/// The closed scope taxonomy (spec §6). `All` grants every scope and,
/// once present in a record's scope list, makes the others redundant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Read,
    Write,
    Manage,
    Audit,
    Billing,
    All,
}

impl Scope {
    pub const CANONICAL_ORDER: [Scope; 6] =
        [Scope::Read, Scope::Write, Scope::Manage, Scope::Audit, Scope::Billing, Scope::All];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Read => "read",
            Scope::Write => "write",
            Scope::Manage => "manage",
            Scope::Audit => "audit",
            Scope::Billing => "billing",
            Scope::All => "*",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Scope::Read),
            "write" => Some(Scope::Write),
            "manage" => Some(Scope::Manage),
            "audit" => Some(Scope::Audit),
            "billing" => Some(Scope::Billing),
            "*" => Some(Scope::All),
            _ => None,
        }
    }
}

/// Sorts `scopes` into canonical order, drops duplicates, and collapses
/// the whole list to `[All]` if `All` was requested alongside anything
/// else — a key's scope list is a set, not an arbitrary sequence, and
/// `All` already subsumes every other member.
fn normalize_scopes(mut scopes: Vec<Scope>) -> Vec<Scope> {
    if scopes.iter().any(|s| *s == Scope::All) {
        return vec![Scope::All];
    }
    scopes.sort();
    scopes.dedup();
    scopes
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub key_hash: String,
    /// First 12 characters, safe to display for identification.
    pub key_prefix: String,
    pub tenant_id: String,
    pub name: String,
    pub scopes: Vec<Scope>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

impl ApiKeyRecord {
    /// Returns `(record, plaintext_key)`; the plaintext is only ever
    /// available at this moment, never reconstructable from storage.
    pub fn new(tenant_id: &str, name: &str, scopes: Vec<Scope>, expires_in_days: Option<u32>) -> (Self, String) {
        let id = Uuid::new_v4();
        use rand::distr::{Alphanumeric, SampleString};
        let random_part = Alphanumeric.sample_string(&mut rand::rng(), 32);
        let plaintext_key = format!("alk_{}_{}", id.simple(), random_part);

        let key_hash = Self::hash_key(&plaintext_key);
        let key_prefix = plaintext_key.chars().take(12).collect();
        let expires_at = expires_in_days.map(|days| Utc::now() + chrono::Duration::days(days as i64));

        let record = Self {
            id,
            key_hash,
            key_prefix,
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            scopes: normalize_scopes(scopes),
            created_at: Utc::now(),
            expires_at,
            last_used_at: None,
            revoked: false,
        };
        (record, plaintext_key)
    }

    pub fn hash_key(key: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(key.as_bytes(), &salt)
            .expect("argon2 hashing does not fail for well-formed input")
            .to_string()
    }

    /// Accepts either a current Argon2id PHC hash or a legacy SHA-256 hex
    /// digest, the latter compared in constant time (spec §6 migration
    /// note).
    pub fn verify_key(plaintext_key: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(plaintext_key.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => {
                use sha2::{Digest, Sha256};
                let legacy = hex::encode(Sha256::digest(plaintext_key.as_bytes()));
                legacy.as_bytes().ct_eq(stored_hash.as_bytes()).into()
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        if self.revoked {
            return false;
        }
        match self.expires_at {
            Some(expires) => Utc::now() <= expires,
            None => true,
        }
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.iter().any(|s| matches!(s, Scope::All) || *s == scope)
    }
}

/// Extracts the record id embedded in a plaintext key of the form
/// `alk_<uuid-simple>_<random>`. `Uuid::parse_str` already accepts the
/// hyphen-less 32-hex-digit "simple" form, so there is no need to
/// re-hyphenate it by hand before parsing.
pub fn key_id_from_plaintext(plaintext_key: &str) -> Result<Uuid, ApiKeyError> {
    let mut parts = plaintext_key.splitn(3, '_');
    let (prefix, uuid_str, rest) = match (parts.next(), parts.next(), parts.next()) {
        (Some(p), Some(u), Some(r)) => (p, u, r),
        _ => return Err(ApiKeyError::InvalidFormat),
    };
    if prefix != "alk" || uuid_str.len() != 32 || rest.is_empty() {
        return Err(ApiKeyError::InvalidFormat);
    }
    Uuid::parse_str(uuid_str).map_err(|_| ApiKeyError::InvalidFormat)
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn create(&self, record: &ApiKeyRecord) -> Result<(), ApiKeyError>;
    async fn find_and_verify_key(&self, plaintext_key: &str) -> Result<Option<ApiKeyRecord>, ApiKeyError>;
    async fn find_by_tenant(&self, tenant_id: &str) -> Result<Vec<ApiKeyRecord>, ApiKeyError>;
    async fn record_usage(&self, id: Uuid) -> Result<(), ApiKeyError>;
    async fn revoke(&self, id: Uuid) -> Result<(), ApiKeyError>;
    async fn delete(&self, id: Uuid) -> Result<(), ApiKeyError>;
}

/// In-memory `ApiKeyStore`. Lookup goes through a `key_prefix -> id`
/// index rather than re-deriving the id from the plaintext key on every
/// call, so a prefix collision (astronomically unlikely for 8 random
/// hex characters, but the index is built to tolerate it) is resolved
/// by checking every candidate's hash rather than assuming uniqueness.
#[derive(Debug, Default)]
pub struct MemoryApiKeyStore {
    keys: tokio::sync::RwLock<HashMap<Uuid, ApiKeyRecord>>,
    prefix_index: tokio::sync::RwLock<HashMap<String, Vec<Uuid>>>,
}

impl MemoryApiKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyStore for MemoryApiKeyStore {
    async fn create(&self, record: &ApiKeyRecord) -> Result<(), ApiKeyError> {
        self.prefix_index.write().await.entry(record.key_prefix.clone()).or_default().push(record.id);
        self.keys.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_and_verify_key(&self, plaintext_key: &str) -> Result<Option<ApiKeyRecord>, ApiKeyError> {
        if plaintext_key.len() < 12 {
            return Err(ApiKeyError::InvalidFormat);
        }
        let prefix: String = plaintext_key.chars().take(12).collect();
        let candidates = self.prefix_index.read().await.get(&prefix).cloned().unwrap_or_default();

        let keys = self.keys.read().await;
        for id in candidates {
            if let Some(record) = keys.get(&id) {
                if ApiKeyRecord::verify_key(plaintext_key, &record.key_hash) {
                    return Ok(Some(record.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn find_by_tenant(&self, tenant_id: &str) -> Result<Vec<ApiKeyRecord>, ApiKeyError> {
        Ok(self
            .keys
            .read()
            .await
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn record_usage(&self, id: Uuid) -> Result<(), ApiKeyError> {
        let mut keys = self.keys.write().await;
        let record = keys.get_mut(&id).ok_or(ApiKeyError::NotFound)?;
        record.last_used_at = Some(Utc::now());
        Ok(())
    }

    async fn revoke(&self, id: Uuid) -> Result<(), ApiKeyError> {
        let mut keys = self.keys.write().await;
        let record = keys.get_mut(&id).ok_or(ApiKeyError::NotFound)?;
        record.revoked = true;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), ApiKeyError> {
        let record = self.keys.write().await.remove(&id).ok_or(ApiKeyError::NotFound)?;
        if let Some(bucket) = self.prefix_index.write().await.get_mut(&record.key_prefix) {
            bucket.retain(|candidate| *candidate != id);
        }
        Ok(())
    }
}

/// Validate a bearer token against `store`, bumping `last_used_at` on
/// success. Format, expiry, and revocation are all checked here so
/// callers only see a single failure mode per `ApiKeyError` variant.
pub async fn validate_api_key<S: ApiKeyStore + ?Sized>(store: &S, plaintext_key: &str) -> Result<ApiKeyRecord, ApiKeyError> {
    if !plaintext_key.starts_with("alk_") || plaintext_key.len() < 40 {
        return Err(ApiKeyError::InvalidFormat);
    }
    let record = store
        .find_and_verify_key(plaintext_key)
        .await?
        .ok_or(ApiKeyError::NotFound)?;

    if record.revoked {
        return Err(ApiKeyError::Revoked);
    }
    if let Some(expires) = record.expires_at {
        if Utc::now() > expires {
            return Err(ApiKeyError::Expired);
        }
    }
    let _ = store.record_usage(record.id).await;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn key_round_trips_through_hash_and_verify() {
        let (record, key) = ApiKeyRecord::new("tenant_a", "ci key", vec![Scope::Read], None);
        assert!(key.starts_with("alk_"));
        assert!(ApiKeyRecord::verify_key(&key, &record.key_hash));
        assert!(!ApiKeyRecord::verify_key("alk_wrong_key_000000000000000000000", &record.key_hash));
    }

    #[tokio::test]
    async fn validate_rejects_revoked_and_wrong_keys() {
        let store = MemoryApiKeyStore::new();
        let (record, key) = ApiKeyRecord::new("tenant_a", "ci key", vec![Scope::Write], None);
        store.create(&record).await.unwrap();

        let validated = validate_api_key(&store, &key).await.unwrap();
        assert!(validated.has_scope(Scope::Write));
        assert!(!validated.has_scope(Scope::Manage));

        store.revoke(record.id).await.unwrap();
        let result = validate_api_key(&store, &key).await;
        assert!(matches!(result, Err(ApiKeyError::Revoked)));

        let result = validate_api_key(&store, "invalid").await;
        assert!(matches!(result, Err(ApiKeyError::InvalidFormat)));
    }

    #[tokio::test]
    async fn all_scope_grants_everything() {
        let (record, _) = ApiKeyRecord::new("tenant_a", "root key", vec![Scope::All], None);
        assert!(record.has_scope(Scope::Billing));
        assert!(record.has_scope(Scope::Manage));
    }

    #[test]
    fn normalize_scopes_dedupes_and_sorts() {
        let scopes = normalize_scopes(vec![Scope::Manage, Scope::Read, Scope::Read]);
        assert_eq!(scopes, vec![Scope::Read, Scope::Manage]);
    }

    #[test]
    fn normalize_scopes_collapses_to_all() {
        let scopes = normalize_scopes(vec![Scope::Read, Scope::All, Scope::Write]);
        assert_eq!(scopes, vec![Scope::All]);
    }

    #[test]
    fn key_id_from_plaintext_parses_simple_uuid_without_rehyphenation() {
        let (record, key) = ApiKeyRecord::new("tenant_a", "ci key", vec![Scope::Read], None);
        assert_eq!(key_id_from_plaintext(&key).unwrap(), record.id);
        assert!(matches!(key_id_from_plaintext("not-a-key"), Err(ApiKeyError::InvalidFormat)));
    }

    #[tokio::test]
    async fn find_and_verify_key_uses_the_prefix_index() {
        let store = MemoryApiKeyStore::new();
        let (record_a, key_a) = ApiKeyRecord::new("tenant_a", "key a", vec![Scope::Read], None);
        let (record_b, key_b) = ApiKeyRecord::new("tenant_a", "key b", vec![Scope::Read], None);
        store.create(&record_a).await.unwrap();
        store.create(&record_b).await.unwrap();

        let found_a = store.find_and_verify_key(&key_a).await.unwrap().unwrap();
        let found_b = store.find_and_verify_key(&key_b).await.unwrap().unwrap();
        assert_eq!(found_a.id, record_a.id);
        assert_eq!(found_b.id, record_b.id);

        store.delete(record_a.id).await.unwrap();
        assert!(store.find_and_verify_key(&key_a).await.unwrap().is_none());
    }
}
