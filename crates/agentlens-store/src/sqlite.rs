//! SQLite backend, grounded on the pool/pragma setup of
//! `vex-persist::sqlite::SqliteBackend`, rebuilt over the relational
//! schema in `migrations/` instead of a single `kv_store` blob table.

use crate::backend::EventStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    AlertHistory, AlertRule, AnalyticsBucket, AnalyticsQuery, ConfigEntry, EventCounts,
    EventFilter, Order, SessionFilter, TenantStats,
};
use agentlens_core::event::{Event, EventType, OrderedObject, Severity};
use agentlens_core::session::{Agent, Session, SessionStatus};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub url: String,
    pub max_connections: u32,
    pub wal_mode: bool,
    pub foreign_keys: bool,
    pub busy_timeout_secs: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:agentlens.db?mode=rwc".to_string(),
            max_connections: 5,
            wal_mode: true,
            foreign_keys: true,
            busy_timeout_secs: 30,
        }
    }
}

impl SqliteConfig {
    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            wal_mode: false,
            foreign_keys: true,
            busy_timeout_secs: 5,
        }
    }
}

#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(url: &str) -> StoreResult<Self> {
        Self::new_with_config(SqliteConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .await
    }

    pub async fn new_with_config(config: SqliteConfig) -> StoreResult<Self> {
        let mut options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .create_if_missing(true);

        if config.foreign_keys {
            options = options.pragma("foreign_keys", "ON");
        }
        options = options.pragma("busy_timeout", config.busy_timeout_secs.to_string());
        if config.wal_mode {
            options = options.pragma("journal_mode", "WAL");
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        info!(url = %config.url, wal = config.wal_mode, "connected to sqlite store");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Internal(format!("migration failed: {e}")))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn severity_str(s: Severity) -> &'static str {
    match s {
        Severity::Debug => "debug",
        Severity::Info => "info",
        Severity::Warn => "warn",
        Severity::Error => "error",
        Severity::Critical => "critical",
    }
}

fn parse_severity(s: &str) -> StoreResult<Severity> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| StoreError::Internal(format!("corrupt severity column: {e}")))
}

fn parse_event_type(s: &str) -> StoreResult<EventType> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| StoreError::Internal(format!("corrupt event_type column: {e}")))
}

fn parse_status(s: &str) -> StoreResult<SessionStatus> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|e| StoreError::Internal(format!("corrupt status column: {e}")))
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Event> {
    let payload: String = row.try_get("payload")?;
    let metadata: String = row.try_get("metadata")?;
    let timestamp: String = row.try_get("timestamp")?;
    Ok(Event {
        id: row.try_get("id")?,
        timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| StoreError::Internal(format!("corrupt timestamp column: {e}")))?
            .with_timezone(&chrono::Utc),
        session_id: row.try_get("session_id")?,
        agent_id: row.try_get("agent_id")?,
        tenant_id: row.try_get("tenant_id")?,
        event_type: parse_event_type(row.try_get::<String, _>("event_type")?.as_str())?,
        severity: parse_severity(row.try_get::<String, _>("severity")?.as_str())?,
        payload: OrderedObject(serde_json::from_str(&payload)?),
        metadata: OrderedObject(serde_json::from_str(&metadata)?),
        prev_hash: row.try_get("prev_hash")?,
        hash: row.try_get("hash")?,
    })
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Session> {
    let started_at: String = row.try_get("started_at")?;
    let ended_at: Option<String> = row.try_get("ended_at")?;
    let tags: String = row.try_get("tags")?;
    Ok(Session {
        id: row.try_get("id")?,
        agent_id: row.try_get("agent_id")?,
        agent_name: row.try_get("agent_name")?,
        tenant_id: row.try_get("tenant_id")?,
        started_at: chrono::DateTime::parse_from_rfc3339(&started_at)
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .with_timezone(&chrono::Utc),
        ended_at: ended_at
            .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&chrono::Utc)))
            .transpose()
            .map_err(|e| StoreError::Internal(e.to_string()))?,
        status: parse_status(row.try_get::<String, _>("status")?.as_str())?,
        event_count: row.try_get::<i64, _>("event_count")? as u64,
        tool_call_count: row.try_get::<i64, _>("tool_call_count")? as u64,
        error_count: row.try_get::<i64, _>("error_count")? as u64,
        llm_call_count: row.try_get::<i64, _>("llm_call_count")? as u64,
        total_input_tokens: row.try_get::<i64, _>("total_input_tokens")? as u64,
        total_output_tokens: row.try_get::<i64, _>("total_output_tokens")? as u64,
        total_cost_usd: row.try_get("total_cost_usd")?,
        tags: serde_json::from_str(&tags)?,
    })
}

fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Agent> {
    let first_seen: String = row.try_get("first_seen_at")?;
    let last_seen: String = row.try_get("last_seen_at")?;
    Ok(Agent {
        tenant_id: row.try_get("tenant_id")?,
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        first_seen_at: chrono::DateTime::parse_from_rfc3339(&first_seen)
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .with_timezone(&chrono::Utc),
        last_seen_at: chrono::DateTime::parse_from_rfc3339(&last_seen)
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .with_timezone(&chrono::Utc),
        session_count: row.try_get::<i64, _>("session_count")? as u64,
    })
}

fn rfc3339(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[async_trait]
impl EventStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert_events(&self, tenant_id: &str, events: Vec<Event>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for event in &events {
            if event.tenant_id != tenant_id {
                return Err(StoreError::Validation(format!(
                    "event {} carries tenant_id {} but was submitted under tenant {}",
                    event.id, event.tenant_id, tenant_id
                )));
            }
            let payload = serde_json::to_string(&event.payload.0)?;
            let metadata = serde_json::to_string(&event.metadata.0)?;
            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO events (tenant_id, id, timestamp, session_id, agent_id, event_type, severity, payload, metadata, prev_hash, hash)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(tenant_id)
            .bind(&event.id)
            .bind(rfc3339(event.timestamp))
            .bind(&event.session_id)
            .bind(&event.agent_id)
            .bind(event.event_type.as_str())
            .bind(severity_str(event.severity))
            .bind(payload)
            .bind(metadata)
            .bind(&event.prev_hash)
            .bind(&event.hash)
            .execute(&mut *tx)
            .await?;
            if inserted.rows_affected() == 0 {
                // Same (tenant_id, id) already present — a re-import of a
                // prior export, not a new event. Aggregates were already
                // updated the first time it was inserted.
                continue;
            }

            let existing_session = sqlx::query("SELECT * FROM sessions WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id)
                .bind(&event.session_id)
                .fetch_optional(&mut *tx)
                .await?;
            let is_new_session = existing_session.is_none();
            let mut session = match &existing_session {
                Some(row) => row_to_session(row)?,
                None => Session::new(tenant_id, &event.session_id, &event.agent_id, event.timestamp),
            };
            session.apply_event(event);
            let tags = serde_json::to_string(&session.tags)?;
            sqlx::query(
                "INSERT INTO sessions (tenant_id, id, agent_id, agent_name, started_at, ended_at, status, event_count, tool_call_count, error_count, llm_call_count, total_input_tokens, total_output_tokens, total_cost_usd, tags)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (tenant_id, id) DO UPDATE SET
                    agent_name = excluded.agent_name, ended_at = excluded.ended_at, status = excluded.status,
                    event_count = excluded.event_count, tool_call_count = excluded.tool_call_count,
                    error_count = excluded.error_count, llm_call_count = excluded.llm_call_count,
                    total_input_tokens = excluded.total_input_tokens, total_output_tokens = excluded.total_output_tokens,
                    total_cost_usd = excluded.total_cost_usd, tags = excluded.tags",
            )
            .bind(tenant_id)
            .bind(&session.id)
            .bind(&session.agent_id)
            .bind(&session.agent_name)
            .bind(rfc3339(session.started_at))
            .bind(session.ended_at.map(rfc3339))
            .bind(format!("{:?}", session.status).to_lowercase())
            .bind(session.event_count as i64)
            .bind(session.tool_call_count as i64)
            .bind(session.error_count as i64)
            .bind(session.llm_call_count as i64)
            .bind(session.total_input_tokens as i64)
            .bind(session.total_output_tokens as i64)
            .bind(session.total_cost_usd)
            .bind(tags)
            .execute(&mut *tx)
            .await?;

            let agent_row = sqlx::query("SELECT * FROM agents WHERE tenant_id = ? AND id = ?")
                .bind(tenant_id)
                .bind(&event.agent_id)
                .fetch_optional(&mut *tx)
                .await?;
            let mut agent = match agent_row {
                Some(row) => row_to_agent(&row)?,
                None => Agent::new(tenant_id, &event.agent_id, &event.agent_id, event.timestamp),
            };
            agent.last_seen_at = event.timestamp;
            if let Some(name) = &session.agent_name {
                agent.name = name.clone();
            }
            if is_new_session {
                agent.session_count += 1;
            }
            sqlx::query(
                "INSERT INTO agents (tenant_id, id, name, description, first_seen_at, last_seen_at, session_count)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (tenant_id, id) DO UPDATE SET
                    name = excluded.name, last_seen_at = excluded.last_seen_at, session_count = excluded.session_count",
            )
            .bind(tenant_id)
            .bind(&agent.id)
            .bind(&agent.name)
            .bind(&agent.description)
            .bind(rfc3339(agent.first_seen_at))
            .bind(rfc3339(agent.last_seen_at))
            .bind(agent.session_count as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_event(&self, tenant_id: &str, id: &str) -> StoreResult<Option<Event>> {
        let row = sqlx::query("SELECT * FROM events WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_event).transpose()
    }

    async fn query_events(&self, tenant_id: &str, filter: &EventFilter) -> StoreResult<(Vec<Event>, u64)> {
        let mut where_clause = "tenant_id = ?".to_string();
        if filter.session_id.is_some() {
            where_clause.push_str(" AND session_id = ?");
        }
        if filter.agent_id.is_some() {
            where_clause.push_str(" AND agent_id = ?");
        }
        if filter.from.is_some() {
            where_clause.push_str(" AND timestamp >= ?");
        }
        if filter.to.is_some() {
            where_clause.push_str(" AND timestamp <= ?");
        }
        if filter.search.is_some() {
            where_clause.push_str(" AND (payload LIKE ? OR metadata LIKE ?)");
        }

        let order = match filter.order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };

        macro_rules! bind_common {
            ($q:expr) => {{
                let mut q = $q.bind(tenant_id);
                if let Some(v) = &filter.session_id {
                    q = q.bind(v);
                }
                if let Some(v) = &filter.agent_id {
                    q = q.bind(v);
                }
                if let Some(v) = filter.from {
                    q = q.bind(rfc3339(v));
                }
                if let Some(v) = filter.to {
                    q = q.bind(rfc3339(v));
                }
                if let Some(v) = &filter.search {
                    let pattern = format!("%{v}%");
                    q = q.bind(pattern.clone()).bind(pattern);
                }
                q
            }};
        }

        let count_sql = format!("SELECT COUNT(*) AS c FROM events WHERE {where_clause}");
        let total: i64 = bind_common!(sqlx::query(&count_sql))
            .fetch_one(&self.pool)
            .await?
            .try_get("c")?;

        let page_sql = format!(
            "SELECT * FROM events WHERE {where_clause} ORDER BY timestamp {order} LIMIT ? OFFSET ?"
        );
        let rows = bind_common!(sqlx::query(&page_sql))
            .bind(filter.limit as i64)
            .bind(filter.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            let event = row_to_event(row)?;
            if let Some(types) = &filter.event_types {
                if !types.contains(&event.event_type) {
                    continue;
                }
            }
            if let Some(sevs) = &filter.severities {
                if !sevs.contains(&event.severity) {
                    continue;
                }
            }
            events.push(event);
        }
        Ok((events, total as u64))
    }

    async fn get_session_timeline(&self, tenant_id: &str, session_id: &str) -> StoreResult<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE tenant_id = ? AND session_id = ? ORDER BY timestamp ASC",
        )
        .bind(tenant_id)
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_event).collect()
    }

    async fn get_last_event_hash(&self, tenant_id: &str, session_id: &str) -> StoreResult<Option<String>> {
        let row = sqlx::query(
            "SELECT hash FROM events WHERE tenant_id = ? AND session_id = ? ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(tenant_id)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.try_get("hash")).transpose()?)
    }

    async fn count_events(&self, tenant_id: &str, filter: &EventFilter) -> StoreResult<u64> {
        let (_, total) = self.query_events(tenant_id, filter).await?;
        Ok(total)
    }

    async fn count_events_batch(&self, tenant_id: &str, filter: &EventFilter) -> StoreResult<EventCounts> {
        let (events, _) = self
            .query_events(
                tenant_id,
                &EventFilter {
                    limit: usize::MAX,
                    ..filter.clone()
                },
            )
            .await?;
        let mut counts = EventCounts::default();
        for e in &events {
            counts.total += 1;
            match e.severity {
                Severity::Error => counts.error += 1,
                Severity::Critical => counts.critical += 1,
                _ => {}
            }
            if e.event_type == EventType::ToolError {
                counts.tool_error += 1;
            }
        }
        Ok(counts)
    }

    async fn upsert_session(&self, session: Session) -> StoreResult<()> {
        let tags = serde_json::to_string(&session.tags)?;
        sqlx::query(
            "INSERT INTO sessions (tenant_id, id, agent_id, agent_name, started_at, ended_at, status, event_count, tool_call_count, error_count, llm_call_count, total_input_tokens, total_output_tokens, total_cost_usd, tags)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (tenant_id, id) DO UPDATE SET
                agent_name = excluded.agent_name, ended_at = excluded.ended_at, status = excluded.status,
                event_count = excluded.event_count, tool_call_count = excluded.tool_call_count,
                error_count = excluded.error_count, llm_call_count = excluded.llm_call_count,
                total_input_tokens = excluded.total_input_tokens, total_output_tokens = excluded.total_output_tokens,
                total_cost_usd = excluded.total_cost_usd, tags = excluded.tags",
        )
        .bind(&session.tenant_id)
        .bind(&session.id)
        .bind(&session.agent_id)
        .bind(&session.agent_name)
        .bind(rfc3339(session.started_at))
        .bind(session.ended_at.map(rfc3339))
        .bind(format!("{:?}", session.status).to_lowercase())
        .bind(session.event_count as i64)
        .bind(session.tool_call_count as i64)
        .bind(session.error_count as i64)
        .bind(session.llm_call_count as i64)
        .bind(session.total_input_tokens as i64)
        .bind(session.total_output_tokens as i64)
        .bind(session.total_cost_usd)
        .bind(tags)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_sessions(&self, tenant_id: &str, filter: &SessionFilter) -> StoreResult<(Vec<Session>, u64)> {
        let rows = sqlx::query("SELECT * FROM sessions WHERE tenant_id = ? ORDER BY started_at DESC")
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        let mut sessions = Vec::new();
        for row in &rows {
            let session = row_to_session(row)?;
            if let Some(aid) = &filter.agent_id {
                if &session.agent_id != aid {
                    continue;
                }
            }
            if let Some(status) = filter.status {
                if session.status != status {
                    continue;
                }
            }
            if let Some(from) = filter.from {
                if session.started_at < from {
                    continue;
                }
            }
            if let Some(to) = filter.to {
                if session.started_at > to {
                    continue;
                }
            }
            if let Some(tags) = &filter.tags {
                if !tags.iter().all(|t| session.tags.contains(t)) {
                    continue;
                }
            }
            sessions.push(session);
        }
        let total = sessions.len() as u64;
        let page = sessions.into_iter().skip(filter.offset).take(filter.limit).collect();
        Ok((page, total))
    }

    async fn get_session(&self, tenant_id: &str, id: &str) -> StoreResult<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn upsert_agent(&self, agent: Agent) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO agents (tenant_id, id, name, description, first_seen_at, last_seen_at, session_count)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (tenant_id, id) DO UPDATE SET
                name = excluded.name, description = excluded.description,
                last_seen_at = excluded.last_seen_at, session_count = excluded.session_count",
        )
        .bind(&agent.tenant_id)
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(rfc3339(agent.first_seen_at))
        .bind(rfc3339(agent.last_seen_at))
        .bind(agent.session_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_agents(&self, tenant_id: &str) -> StoreResult<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM agents WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn get_agent(&self, tenant_id: &str, id: &str) -> StoreResult<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn get_analytics(&self, tenant_id: &str, query: &AnalyticsQuery) -> StoreResult<Vec<AnalyticsBucket>> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE tenant_id = ? AND timestamp >= ? AND timestamp <= ?",
        )
        .bind(tenant_id)
        .bind(rfc3339(query.from))
        .bind(rfc3339(query.to))
        .fetch_all(&self.pool)
        .await?;
        let events: Vec<Event> = rows.iter().map(row_to_event).collect::<StoreResult<_>>()?;
        Ok(crate::types::bucket_events(&events, query))
    }

    async fn create_alert_rule(&self, rule: AlertRule) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO alert_rules (tenant_id, id, name, condition, threshold, enabled, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&rule.tenant_id)
        .bind(&rule.id)
        .bind(&rule.name)
        .bind(&rule.condition)
        .bind(rule.threshold)
        .bind(rule.enabled)
        .bind(rfc3339(rule.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_alert_rules(&self, tenant_id: &str) -> StoreResult<Vec<AlertRule>> {
        let rows = sqlx::query("SELECT * FROM alert_rules WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let created_at: String = row.try_get("created_at")?;
                Ok(AlertRule {
                    tenant_id: row.try_get("tenant_id")?,
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    condition: row.try_get("condition")?,
                    threshold: row.try_get("threshold")?,
                    enabled: row.try_get("enabled")?,
                    created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|e| StoreError::Internal(e.to_string()))?
                        .with_timezone(&chrono::Utc),
                })
            })
            .collect()
    }

    async fn delete_alert_rule(&self, tenant_id: &str, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM alert_rules WHERE tenant_id = ? AND id = ?")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_alert_history(&self, entry: AlertHistory) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO alert_history (tenant_id, id, rule_id, triggered_at, resolved_at, detail)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.tenant_id)
        .bind(&entry.id)
        .bind(&entry.rule_id)
        .bind(rfc3339(entry.triggered_at))
        .bind(entry.resolved_at.map(rfc3339))
        .bind(&entry.detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_alert_history(&self, tenant_id: &str, rule_id: Option<&str>) -> StoreResult<Vec<AlertHistory>> {
        let rows = if let Some(rule_id) = rule_id {
            sqlx::query("SELECT * FROM alert_history WHERE tenant_id = ? AND rule_id = ? ORDER BY triggered_at DESC")
                .bind(tenant_id)
                .bind(rule_id)
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query("SELECT * FROM alert_history WHERE tenant_id = ? ORDER BY triggered_at DESC")
                .bind(tenant_id)
                .fetch_all(&self.pool)
                .await?
        };
        rows.iter()
            .map(|row| {
                let triggered_at: String = row.try_get("triggered_at")?;
                let resolved_at: Option<String> = row.try_get("resolved_at")?;
                Ok(AlertHistory {
                    tenant_id: row.try_get("tenant_id")?,
                    id: row.try_get("id")?,
                    rule_id: row.try_get("rule_id")?,
                    triggered_at: chrono::DateTime::parse_from_rfc3339(&triggered_at)
                        .map_err(|e| StoreError::Internal(e.to_string()))?
                        .with_timezone(&chrono::Utc),
                    resolved_at: resolved_at
                        .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&chrono::Utc)))
                        .transpose()
                        .map_err(|e| StoreError::Internal(e.to_string()))?,
                    detail: row.try_get("detail")?,
                })
            })
            .collect()
    }

    async fn apply_retention(&self, tenant_id: &str, cutoff: chrono::DateTime<chrono::Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM events WHERE tenant_id = ? AND timestamp < ?")
            .bind(tenant_id)
            .bind(rfc3339(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn apply_audit_log_retention(&self, tenant_id: &str, cutoff: chrono::DateTime<chrono::Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM audit_log WHERE tenant_id = ? AND at < ?")
            .bind(tenant_id)
            .bind(rfc3339(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn get_stats(&self, tenant_id: &str) -> StoreResult<TenantStats> {
        let event_count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM events WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?
            .try_get("c")?;
        let session_count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM sessions WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?
            .try_get("c")?;
        let agent_count: i64 = sqlx::query("SELECT COUNT(*) AS c FROM agents WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_one(&self.pool)
            .await?
            .try_get("c")?;
        Ok(TenantStats {
            event_count: event_count as u64,
            session_count: session_count as u64,
            agent_count: agent_count as u64,
        })
    }

    async fn get_config(&self, tenant_id: &str) -> StoreResult<Vec<ConfigEntry>> {
        let rows = sqlx::query("SELECT * FROM config_kv WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let value: String = row.try_get("value")?;
                Ok(ConfigEntry {
                    tenant_id: row.try_get("tenant_id")?,
                    key: row.try_get("key")?,
                    value: serde_json::from_str(&value)?,
                    is_secret: row.try_get("is_secret")?,
                })
            })
            .collect()
    }

    async fn set_config(&self, entry: ConfigEntry) -> StoreResult<()> {
        let value = serde_json::to_string(&entry.value)?;
        sqlx::query(
            "INSERT INTO config_kv (tenant_id, key, value, is_secret) VALUES (?, ?, ?, ?)
             ON CONFLICT (tenant_id, key) DO UPDATE SET value = excluded.value, is_secret = excluded.is_secret",
        )
        .bind(&entry.tenant_id)
        .bind(&entry.key)
        .bind(value)
        .bind(entry.is_secret)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_tenants(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT tenant_id FROM events")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|r| Ok(r.try_get("tenant_id")?)).collect()
    }

    async fn record_audit_log(&self, tenant_id: &str, action: &str, detail: serde_json::Value) -> StoreResult<()> {
        sqlx::query("INSERT INTO audit_log (tenant_id, at, action, detail) VALUES (?, ?, ?, ?)")
            .bind(tenant_id)
            .bind(rfc3339(chrono::Utc::now()))
            .bind(action)
            .bind(serde_json::to_string(&detail)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        !self.pool.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlens_core::event::{EventType, OrderedObject};
    use agentlens_core::hash::HashInput;

    async fn test_store() -> SqliteStore {
        SqliteStore::new_with_config(SqliteConfig::memory()).await.unwrap()
    }

    fn make_event(tenant: &str, session: &str, agent: &str, id: &str, prev: Option<&str>) -> Event {
        let ts = chrono::Utc::now();
        let payload = OrderedObject::new();
        let metadata = OrderedObject::new();
        let hash = HashInput {
            id,
            timestamp: &ts,
            session_id: session,
            agent_id: agent,
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload: &payload,
            metadata: &metadata,
            prev_hash: prev,
        }
        .compute_hash();
        Event {
            id: id.to_string(),
            timestamp: ts,
            session_id: session.to_string(),
            agent_id: agent.to_string(),
            tenant_id: tenant.to_string(),
            event_type: EventType::ToolCall,
            severity: Severity::Info,
            payload,
            metadata,
            prev_hash: prev.map(str::to_string),
            hash,
        }
    }

    #[tokio::test]
    async fn insert_and_query_round_trips() {
        let store = test_store().await;
        let event = make_event("t_a", "s1", "agent_1", "e1", None);
        store.insert_events("t_a", vec![event.clone()]).await.unwrap();

        let fetched = store.get_event("t_a", "e1").await.unwrap().unwrap();
        assert_eq!(fetched.hash, event.hash);

        let session = store.get_session("t_a", "s1").await.unwrap().unwrap();
        assert_eq!(session.event_count, 1);
        assert_eq!(session.tool_call_count, 1);

        let agents = store.list_agents("t_a").await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].session_count, 1);
    }

    #[tokio::test]
    async fn retention_deletes_old_rows_only() {
        let store = test_store().await;
        let e1 = make_event("t_a", "s1", "agent_1", "e1", None);
        store.insert_events("t_a", vec![e1]).await.unwrap();

        let future_cutoff = chrono::Utc::now() + chrono::Duration::days(1);
        let deleted = store.apply_retention("t_a", future_cutoff).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_session_timeline("t_a", "s1").await.unwrap().is_empty());
    }
}
