//! History endpoints
//!
//! Plain JSON reads over the stored history. Store failures surface as 500
//! with the error text; everything else is a 200.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::error;

use crate::store::StoreError;

use super::{AppState, ConnectionEvent, MessagesResponse};

const DEFAULT_PAGE_SIZE: u32 = 10;

/// Query parameters for `GET /messages`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default, rename = "pageSize")]
    pub page_size: Option<i64>,
}

impl HistoryQuery {
    /// Effective page, floored at 1.
    pub fn page(&self) -> u32 {
        match self.page {
            Some(page) if page >= 1 => page.min(i64::from(u32::MAX)) as u32,
            _ => 1,
        }
    }

    /// Effective page size; anything below 1 falls back to the default.
    pub fn page_size(&self) -> u32 {
        match self.page_size {
            Some(size) if size >= 1 => size.min(i64::from(u32::MAX)) as u32,
            _ => DEFAULT_PAGE_SIZE,
        }
    }
}

/// `GET /messages?page=&pageSize=` — one page of history, newest first.
pub async fn messages_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MessagesResponse>, (StatusCode, String)> {
    let (messages, total) = state
        .store
        .recent_messages(query.page(), query.page_size())
        .await
        .map_err(internal_error)?;
    Ok(Json(MessagesResponse { total, messages }))
}

/// `GET /connection-history` — every connection event, newest first.
pub async fn connection_history_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<ConnectionEvent>>, (StatusCode, String)> {
    let events = state
        .store
        .connection_history()
        .await
        .map_err(internal_error)?;
    Ok(Json(events))
}

fn internal_error(e: StoreError) -> (StatusCode, String) {
    error!("history query failed: {e}");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
