//! WebSocket transport adapter
//!
//! Validates the username, upgrades the connection, and bridges the socket
//! to the hub: inbound frames become broadcast intents with `user`/`time`
//! re-stamped by the server, and hub fan-out drains through a per-socket
//! writer task.

use std::sync::LazyLock;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use regex::Regex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::hub::{Connection, Outbound};

use super::{AppState, ChatMessage, InboundMessage};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-zA-Z0-9._-]+$").expect("valid username pattern"));

/// Query parameters for the `/ws` upgrade.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub username: String,
}

/// Check a username against the configured length bounds and the allowed
/// character class.
pub fn validate_username(config: &Config, username: &str) -> bool {
    if username.len() < config.min_username_len || username.len() > config.max_username_len {
        return false;
    }
    USERNAME_RE.is_match(username)
}

fn rejection_message(config: &Config) -> String {
    format!(
        "Error: Username must be {}-{} characters long and contain only letters, digits, '-', '_', or '.'",
        config.min_username_len, config.max_username_len
    )
}

/// `GET /ws?username=NAME` — validate, upgrade, and hand the socket to the
/// hub. Invalid usernames are rejected with 400 before any hub interaction.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if !validate_username(&state.config, &query.username) {
        warn!("rejected connection with invalid username: {:?}", query.username);
        return (StatusCode::BAD_REQUEST, rejection_message(&state.config)).into_response();
    }

    let max_message_size = state.config.max_message_size;
    let username = query.username;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, username, state))
}

/// Drive one client session: greet, register, then pump frames until the
/// socket dies or the hub closes it.
async fn handle_socket(socket: WebSocket, username: String, state: AppState) {
    info!("new connection for {username}");
    let (mut sender, mut receiver) = socket.split();

    // Only the new member sees the greeting; it is not broadcast.
    let greeting = ChatMessage::system(format!("Connected as {username}."));
    if send_json(&mut sender, &greeting).await.is_err() {
        warn!("failed to greet {username}, dropping connection");
        return;
    }

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let connection = Connection::new(username.clone(), outbound_tx);
    let id = connection.id();
    state.hub.register(connection);

    // Writer task: drains hub fan-out into the socket. Ends when the hub
    // closes the connection or the socket stops accepting writes.
    let writer = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            match outbound {
                Outbound::Message(message) => {
                    if send_json(&mut sender, &message).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Read loop: every decoded frame is re-stamped and broadcast. Any
    // read or decode failure (including a clean close) ends the session.
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let inbound: InboundMessage = match serde_json::from_str(&text) {
                    Ok(inbound) => inbound,
                    Err(e) => {
                        debug!("undecodable frame from {username}: {e}");
                        break;
                    }
                };
                state
                    .hub
                    .broadcast(ChatMessage::now(&username, inbound.text));
            }
            Ok(Message::Close(_)) => {
                debug!("client {username} requested close");
                break;
            }
            // Ping/pong are handled by axum; binary frames are ignored.
            Ok(_) => {}
            Err(e) => {
                debug!("read error from {username}: {e}");
                break;
            }
        }
    }

    state.hub.unregister(id, &username);
    state
        .hub
        .broadcast(ChatMessage::system(format!("{username} has disconnected.")));

    // The hub answers the unregister intent with a close, which ends the
    // writer. After shutdown the channel is simply dropped instead.
    let _ = writer.await;
    info!("connection for {username} closed");
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ChatMessage,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(message)?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}
