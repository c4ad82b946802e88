//! HTTP and WebSocket surface
//!
//! One axum router serves the WebSocket chat endpoint and the history
//! endpoints. Handlers share the hub handle and the store through
//! `AppState`.

mod http;
mod protocol;
mod ws;

pub use http::*;
pub use protocol::*;
pub use ws::*;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::config::Config;
use crate::hub::Hub;
use crate::store::ChatStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Hub,
    pub store: Arc<dyn ChatStore>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/messages", get(messages_handler))
        .route("/connection-history", get(connection_history_handler))
        .with_state(state)
}
