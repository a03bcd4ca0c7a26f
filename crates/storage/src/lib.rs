mod tracker;

use std::str::FromStr;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

pub use tracker::{SqliteTracker, TrackerStore};

pub const INIT_SQL: &str = include_str!("../../../scripts/init_db.sql");

pub const REQUIRED_TABLES: [&str; 4] = ["runs", "tracker_state", "raw_events", "incidents"];

const MEMORY_PREFIX: &str = "sqlite::memory:";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Incident {
    pub id: i64,
    pub run_id: String,
    pub ts_ms: i64,
    pub severity: String,
    pub kind: String,
    pub message: String,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)?.create_if_missing(true);
        // Every pooled connection to `:memory:` would get its own database.
        let max_connections = if path.starts_with(MEMORY_PREFIX) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        run_init_sql(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn insert_run(&self, run_id: &str, git_sha: Option<&str>) -> Result<()> {
        let host = hostname::get()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT OR REPLACE INTO runs (run_id, started_at_ms, git_sha, host) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(git_sha)
        .bind(host)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Names from [`REQUIRED_TABLES`] that are missing from the database.
    pub async fn validate_required_tables(&self) -> Result<Vec<String>> {
        let present = sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master WHERE type = 'table'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(REQUIRED_TABLES
            .iter()
            .filter(|table| !present.iter().any(|name| name == *table))
            .map(|table| table.to_string())
            .collect())
    }

    pub async fn log_event(
        &self,
        run_id: &str,
        source: &str,
        topic: &str,
        payload_json: &str,
    ) -> Result<()> {
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO raw_events (run_id, ts_ms, source, topic, payload_json) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(source)
        .bind(topic)
        .bind(payload_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn log_incident(
        &self,
        run_id: &str,
        severity: &str,
        kind: &str,
        message: &str,
    ) -> Result<()> {
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO incidents (run_id, ts_ms, severity, kind, message) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(run_id)
        .bind(ts_ms)
        .bind(severity)
        .bind(kind)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Newest first.
    pub async fn recent_incidents(&self, limit: u32) -> Result<Vec<Incident>> {
        let rows = sqlx::query_as::<_, Incident>(
            "SELECT id, run_id, ts_ms, severity, kind, message FROM incidents ORDER BY id DESC LIMIT ?1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_value(&self, name: &str) -> Result<Option<i64>> {
        let value = sqlx::query_scalar::<_, i64>("SELECT value FROM tracker_state WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn put_value(&self, name: &str, value: i64) -> Result<()> {
        let ts_ms = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO tracker_state (name, value, updated_at_ms) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at_ms = excluded.updated_at_ms",
        )
        .bind(name)
        .bind(value)
        .bind(ts_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Writes `value` only if the record still holds `expected` (`None`: no
    /// record yet). Returns whether the write happened.
    pub async fn compare_and_put(
        &self,
        name: &str,
        expected: Option<i64>,
        value: i64,
    ) -> Result<bool> {
        let ts_ms = Utc::now().timestamp_millis();
        let result = match expected {
            Some(expected) => {
                sqlx::query(
                    "UPDATE tracker_state SET value = ?2, updated_at_ms = ?3 WHERE name = ?1 AND value = ?4",
                )
                .bind(name)
                .bind(value)
                .bind(ts_ms)
                .bind(expected)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "INSERT INTO tracker_state (name, value, updated_at_ms) VALUES (?1, ?2, ?3) \
                     ON CONFLICT(name) DO NOTHING",
                )
                .bind(name)
                .bind(value)
                .bind(ts_ms)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() == 1)
    }

    pub async fn clear_value(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tracker_state WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub async fn init_sqlite(path: &str) -> Result<Store> {
    let store = Store::connect(path).await?;
    info!(path = path, "sqlite initialized");
    Ok(store)
}

async fn run_init_sql(pool: &SqlitePool) -> Result<()> {
    for statement in INIT_SQL.split(';') {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(pool).await?;
    }
    Ok(())
}
