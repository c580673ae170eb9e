//! SQLite-backed `ApiKeyStore`, grounded on [`sqlite::SqliteStore`]'s
//! pool/pragma setup and the `api_keys` table in `migrations/0001_init.sql`.
//! Keeps key records durable across restarts, unlike [`api_key::MemoryApiKeyStore`]
//! which is appropriate only for tests and ephemeral deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::api_key::{key_id_from_plaintext, ApiKeyError, ApiKeyRecord, ApiKeyStore, Scope};

#[derive(Debug, Clone)]
pub struct SqliteApiKeyStore {
    pool: SqlitePool,
}

impl SqliteApiKeyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ApiKeyRecord, ApiKeyError> {
    let id: String = row.try_get("id").map_err(|e| ApiKeyError::Storage(e.to_string()))?;
    let scopes_json: String = row.try_get("scopes").map_err(|e| ApiKeyError::Storage(e.to_string()))?;
    let scopes: Vec<String> =
        serde_json::from_str(&scopes_json).map_err(|e| ApiKeyError::Storage(e.to_string()))?;
    let created_at: String = row.try_get("created_at").map_err(|e| ApiKeyError::Storage(e.to_string()))?;
    let expires_at: Option<String> = row.try_get("expires_at").map_err(|e| ApiKeyError::Storage(e.to_string()))?;
    let last_used_at: Option<String> =
        row.try_get("last_used_at").map_err(|e| ApiKeyError::Storage(e.to_string()))?;

    Ok(ApiKeyRecord {
        id: Uuid::parse_str(&id).map_err(|e| ApiKeyError::Storage(e.to_string()))?,
        key_hash: row.try_get("key_hash").map_err(|e| ApiKeyError::Storage(e.to_string()))?,
        key_prefix: row.try_get("key_prefix").map_err(|e| ApiKeyError::Storage(e.to_string()))?,
        tenant_id: row.try_get("tenant_id").map_err(|e| ApiKeyError::Storage(e.to_string()))?,
        name: row.try_get("name").map_err(|e| ApiKeyError::Storage(e.to_string()))?,
        scopes: scopes.iter().filter_map(|s| Scope::parse(s)).collect(),
        created_at: parse_rfc3339(&created_at)?,
        expires_at: expires_at.as_deref().map(parse_rfc3339).transpose()?,
        last_used_at: last_used_at.as_deref().map(parse_rfc3339).transpose()?,
        revoked: row.try_get::<i64, _>("revoked").map_err(|e| ApiKeyError::Storage(e.to_string()))? != 0,
    })
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, ApiKeyError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ApiKeyError::Storage(e.to_string()))
}

#[async_trait]
impl ApiKeyStore for SqliteApiKeyStore {
    async fn create(&self, record: &ApiKeyRecord) -> Result<(), ApiKeyError> {
        let scopes_json = serde_json::to_string(&record.scopes.iter().map(|s| s.as_str()).collect::<Vec<_>>())
            .map_err(|e| ApiKeyError::Storage(e.to_string()))?;
        sqlx::query(
            "INSERT INTO api_keys (id, key_hash, key_prefix, tenant_id, name, scopes, created_at, expires_at, last_used_at, revoked)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.key_hash)
        .bind(&record.key_prefix)
        .bind(&record.tenant_id)
        .bind(&record.name)
        .bind(scopes_json)
        .bind(record.created_at.to_rfc3339())
        .bind(record.expires_at.map(|t| t.to_rfc3339()))
        .bind(record.last_used_at.map(|t| t.to_rfc3339()))
        .bind(record.revoked)
        .execute(&self.pool)
        .await
        .map_err(|e| ApiKeyError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn find_and_verify_key(&self, plaintext_key: &str) -> Result<Option<ApiKeyRecord>, ApiKeyError> {
        let id = key_id_from_plaintext(plaintext_key)?;

        let row = sqlx::query("SELECT * FROM api_keys WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ApiKeyError::Storage(e.to_string()))?;

        match row {
            Some(row) => {
                let record = row_to_record(&row)?;
                if ApiKeyRecord::verify_key(plaintext_key, &record.key_hash) {
                    Ok(Some(record))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    async fn find_by_tenant(&self, tenant_id: &str) -> Result<Vec<ApiKeyRecord>, ApiKeyError> {
        let rows = sqlx::query("SELECT * FROM api_keys WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ApiKeyError::Storage(e.to_string()))?;
        rows.iter().map(row_to_record).collect()
    }

    async fn record_usage(&self, id: Uuid) -> Result<(), ApiKeyError> {
        let result = sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| ApiKeyError::Storage(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(ApiKeyError::NotFound);
        }
        Ok(())
    }

    async fn revoke(&self, id: Uuid) -> Result<(), ApiKeyError> {
        let result = sqlx::query("UPDATE api_keys SET revoked = 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| ApiKeyError::Storage(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(ApiKeyError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), ApiKeyError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| ApiKeyError::Storage(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(ApiKeyError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::{SqliteConfig, SqliteStore};

    async fn test_store() -> SqliteApiKeyStore {
        let backend = SqliteStore::new_with_config(SqliteConfig::memory()).await.unwrap();
        SqliteApiKeyStore::new(backend.pool().clone())
    }

    #[tokio::test]
    async fn create_and_verify_round_trips() {
        let store = test_store().await;
        let (record, plaintext) = ApiKeyRecord::new("tenant_a", "ci key", vec![Scope::Write], None);
        store.create(&record).await.unwrap();

        let found = store.find_and_verify_key(&plaintext).await.unwrap().unwrap();
        assert_eq!(found.id, record.id);
        assert!(found.has_scope(Scope::Write));
    }

    #[tokio::test]
    async fn revoke_persists_and_blocks_future_lookups_via_is_valid() {
        let store = test_store().await;
        let (record, plaintext) = ApiKeyRecord::new("tenant_a", "ci key", vec![Scope::Read], None);
        store.create(&record).await.unwrap();
        store.revoke(record.id).await.unwrap();

        let found = store.find_and_verify_key(&plaintext).await.unwrap().unwrap();
        assert!(found.revoked);
        assert!(!found.is_valid());
    }

    #[tokio::test]
    async fn find_by_tenant_filters_correctly() {
        let store = test_store().await;
        let (a, _) = ApiKeyRecord::new("tenant_a", "key a", vec![Scope::Read], None);
        let (b, _) = ApiKeyRecord::new("tenant_b", "key b", vec![Scope::Read], None);
        store.create(&a).await.unwrap();
        store.create(&b).await.unwrap();

        let found = store.find_by_tenant("tenant_a").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
    }
}
