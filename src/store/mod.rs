//! Durable persistence for messages and connection events
//!
//! The hub and the HTTP layer only ever see the `ChatStore` trait; SQL
//! lives behind the `SqliteStore` implementation.

mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::server::{ChatMessage, ConnectionEvent, EventKind};

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed row: {0}")]
    Malformed(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence port.
///
/// The hub consumes the write side and treats failures as best-effort:
/// they are logged and swallowed, never propagated to register, unregister,
/// or broadcast. The history endpoints consume the read side.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Append a chat message to history.
    async fn save_message(&self, user: &str, text: &str) -> Result<(), StoreError>;

    /// Append a connect/disconnect event to the audit trail.
    async fn log_connection(&self, user: &str, kind: EventKind) -> Result<(), StoreError>;

    /// One page of message history, newest first, plus the total count.
    async fn recent_messages(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<ChatMessage>, i64), StoreError>;

    /// Every recorded connection event, newest first.
    async fn connection_history(&self) -> Result<Vec<ConnectionEvent>, StoreError>;
}
