//! Live client connections
//!
//! A `Connection` couples a validated username with the outbound delivery
//! capability for one socket. The hub owns a connection once it is
//! registered; the transport keeps only the id around so it can issue the
//! eventual unregister intent.

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::server::ChatMessage;

/// Identity of a live connection. Usernames are not unique across
/// concurrent sessions, so membership is keyed by this id.
pub type ConnectionId = Uuid;

/// Frames travelling from the hub to a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Deliver a chat message to the client.
    Message(ChatMessage),
    /// Ask the writer task to close the socket.
    Close,
}

/// The peer's writer task is no longer receiving.
#[derive(Debug, Error)]
#[error("connection is no longer receiving")]
pub struct SendError;

/// One live client connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    username: String,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    /// Create a connection around the outbound channel of its writer task.
    pub fn new(username: impl Into<String>, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            outbound,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Attempt delivery. Fails only when the writer task is gone, which the
    /// hub treats as a disconnect.
    pub fn send(&self, message: ChatMessage) -> Result<(), SendError> {
        self.outbound
            .send(Outbound::Message(message))
            .map_err(|_| SendError)
    }

    /// Ask the writer task to close the socket. Best-effort; a dead writer
    /// already means the socket is gone.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}
