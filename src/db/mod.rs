//! Database module

pub mod analytics;
mod schema;
mod write_buffer;

pub use write_buffer::{start_write_buffer, WriteSender};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use crate::config::DatabaseConfig;
use crate::user_agent::UserAgentInfo;

/// One recorded request against the notes API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub id: Option<i64>,
    pub ip: String,
    pub visitor_id: Option<String>,
    pub user_agent: String,
    pub path: String,
    pub method: String,
    pub status_code: u16,
    pub response_time_ms: f64,
    pub referer: String,
    pub device_type: String,
    pub os: String,
    pub browser: String,
    pub created_at: DateTime<Utc>,
}

impl AccessLogEntry {
    pub fn new(ip: String, method: String, path: String, status_code: u16) -> Self {
        Self {
            id: None,
            ip,
            visitor_id: None,
            user_agent: String::new(),
            path,
            method,
            status_code,
            response_time_ms: 0.0,
            referer: String::new(),
            device_type: crate::user_agent::UNKNOWN.to_string(),
            os: crate::user_agent::UNKNOWN.to_string(),
            browser: crate::user_agent::UNKNOWN.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: String, info: &UserAgentInfo) -> Self {
        self.user_agent = user_agent;
        self.device_type = info.device_type.to_string();
        self.os = info.os.to_string();
        self.browser = info.browser.to_string();
        self
    }

    pub fn with_visitor_id(mut self, visitor_id: Option<String>) -> Self {
        self.visitor_id = visitor_id.filter(|v| !v.is_empty());
        self
    }

    pub fn with_referer(mut self, referer: String) -> Self {
        self.referer = referer;
        self
    }

    pub fn with_response_time(mut self, response_time_ms: f64) -> Self {
        self.response_time_ms = response_time_ms;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

#[derive(sqlx::FromRow)]
struct AccessLogRow {
    id: i64,
    ip: String,
    visitor_id: Option<String>,
    user_agent: String,
    path: String,
    method: String,
    status_code: i64,
    response_time_ms: f64,
    referer: String,
    device_type: String,
    os: String,
    browser: String,
    created_at: i64,
}

impl From<AccessLogRow> for AccessLogEntry {
    fn from(row: AccessLogRow) -> Self {
        Self {
            id: Some(row.id),
            ip: row.ip,
            visitor_id: row.visitor_id,
            user_agent: row.user_agent,
            path: row.path,
            method: row.method,
            status_code: u16::try_from(row.status_code).unwrap_or_default(),
            response_time_ms: row.response_time_ms,
            referer: row.referer,
            device_type: row.device_type,
            os: row.os,
            browser: row.browser,
            created_at: DateTime::from_timestamp_millis(row.created_at).unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(&config.url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&format!("sqlite:{}?mode=rwc", config.url))
            .await?;
        Ok(Self { pool })
    }

    /// Private in-memory database; one connection so every query sees the same data
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        // Enable WAL mode for better concurrency
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(schema::CREATE_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_CREATED_AT)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_IP)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_VISITOR)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_PATH)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn insert_log(&self, entry: &AccessLogEntry) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Ok(insert_log_with(&mut *conn, entry).await?)
    }

    /// Insert a batch of entries in a single transaction
    pub async fn batch_insert_logs(&self, entries: &[AccessLogEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            insert_log_with(&mut *tx, entry).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_total_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM access_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

async fn insert_log_with(conn: &mut sqlx::SqliteConnection, entry: &AccessLogEntry) -> sqlx::Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO access_logs (ip, visitor_id, user_agent, path, method, status_code, response_time_ms, referer, device_type, os, browser, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.ip)
    .bind(&entry.visitor_id)
    .bind(&entry.user_agent)
    .bind(&entry.path)
    .bind(&entry.method)
    .bind(i64::from(entry.status_code))
    .bind(entry.response_time_ms)
    .bind(&entry.referer)
    .bind(&entry.device_type)
    .bind(&entry.os)
    .bind(&entry.browser)
    .bind(entry.created_at.timestamp_millis())
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}
