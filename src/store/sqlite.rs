//! SQLite-backed chat store
//!
//! Append-only tables for messages and connection events, created on open.
//! Timestamps are stored as RFC 3339 text stamped with the server clock;
//! ordering ties within one second fall back to insertion order.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use crate::server::{ChatMessage, ConnectionEvent, EventKind};

use super::{ChatStore, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_created ON messages(created_at);

CREATE TABLE IF NOT EXISTS connection_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    event_type TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_connection_logs_created ON connection_logs(created_at);
"#;

/// SQLite implementation of the persistence port.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database behind `database_url`, creating the file and the
    /// schema if they do not exist yet.
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        info!("connecting to database: {database_url}");
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Open an in-memory database. A single pooled connection keeps the
    /// database alive and visible across calls.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn save_message(&self, user: &str, text: &str) -> Result<(), StoreError> {
        debug!("saving message from {user}");
        sqlx::query("INSERT INTO messages (username, message, created_at) VALUES (?, ?, ?)")
            .bind(user)
            .bind(text)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn log_connection(&self, user: &str, kind: EventKind) -> Result<(), StoreError> {
        debug!("logging connection event: {user} - {}", kind.as_str());
        sqlx::query("INSERT INTO connection_logs (username, event_type, created_at) VALUES (?, ?, ?)")
            .bind(user)
            .bind(kind.as_str())
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<ChatMessage>, i64), StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;

        // The product of two u32-range values can exceed i64::MAX; a
        // saturated offset is simply a page past the end.
        let offset = (i64::from(page) - 1).saturating_mul(i64::from(page_size));
        let rows = sqlx::query(
            "SELECT username, message, created_at FROM messages \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(i64::from(page_size))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(ChatMessage {
                user: row.try_get("username")?,
                text: row.try_get("message")?,
                time: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
            });
        }
        Ok((messages, total))
    }

    async fn connection_history(&self) -> Result<Vec<ConnectionEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT username, event_type, created_at FROM connection_logs \
             ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.try_get("event_type")?;
            events.push(ConnectionEvent {
                user: row.try_get("username")?,
                kind: kind
                    .parse()
                    .map_err(|e| StoreError::Malformed(format!("{e}")))?,
                time: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
            });
        }
        Ok(events)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| StoreError::Malformed(format!("bad timestamp {raw:?}: {e}")))
}
