//! Connection hub
//!
//! Single source of truth for who is connected. Register, unregister,
//! broadcast, and shutdown intents each travel over their own channel and
//! are consumed by one loop, so membership is only ever touched from one
//! place and no lock is needed. Persistence runs inside the loop and is
//! best-effort: a store failure is logged, never surfaced to callers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::server::{ChatMessage, EventKind};
use crate::store::ChatStore;

use super::{Connection, ConnectionId};

/// Unregister intent payload. Carries the username separately so the audit
/// trail records a disconnect even when the member is already gone.
#[derive(Debug)]
struct Unregister {
    id: ConnectionId,
    username: String,
}

/// Handle for submitting intents to the hub loop.
///
/// Every method is fire-and-forget: once an intent is accepted it cannot
/// fail, and intents submitted after shutdown are silently dropped.
#[derive(Clone)]
pub struct Hub {
    register_tx: mpsc::UnboundedSender<Connection>,
    unregister_tx: mpsc::UnboundedSender<Unregister>,
    broadcast_tx: mpsc::UnboundedSender<ChatMessage>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Hub {
    /// Create a hub handle and the task that services it. The task must be
    /// spawned for intents to make progress.
    pub fn channel(store: Arc<dyn ChatStore>) -> (Hub, HubTask) {
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let hub = Hub {
            register_tx,
            unregister_tx,
            broadcast_tx,
            shutdown_tx,
        };
        let task = HubTask {
            register_rx,
            unregister_rx,
            broadcast_rx,
            shutdown_rx,
            store,
            members: HashMap::new(),
        };
        (hub, task)
    }

    /// Hand a connection to the hub. The hub owns it from here on.
    pub fn register(&self, connection: Connection) {
        let _ = self.register_tx.send(connection);
    }

    /// Remove a connection. Harmless to call twice; the disconnect audit
    /// event fires either way.
    pub fn unregister(&self, id: ConnectionId, username: impl Into<String>) {
        let _ = self.unregister_tx.send(Unregister {
            id,
            username: username.into(),
        });
    }

    /// Persist a message and fan it out to every member.
    pub fn broadcast(&self, message: ChatMessage) {
        let _ = self.broadcast_tx.send(message);
    }

    /// Stop the hub loop, disconnecting all members. Idempotent; signaling
    /// an already stopped hub is a no-op.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// The single consumer that owns the membership set.
pub struct HubTask {
    register_rx: mpsc::UnboundedReceiver<Connection>,
    unregister_rx: mpsc::UnboundedReceiver<Unregister>,
    broadcast_rx: mpsc::UnboundedReceiver<ChatMessage>,
    shutdown_rx: broadcast::Receiver<()>,
    store: Arc<dyn ChatStore>,
    members: HashMap<ConnectionId, Connection>,
}

impl HubTask {
    /// Service intents until shutdown. One intent is handled fully before
    /// the next is taken; enqueue order is preserved per intent kind but no
    /// order is promised across kinds.
    pub async fn run(mut self) {
        info!("hub started");
        loop {
            tokio::select! {
                // Also fires when every handle is dropped.
                _ = self.shutdown_rx.recv() => {
                    self.handle_shutdown().await;
                    break;
                }
                Some(connection) = self.register_rx.recv() => {
                    self.handle_register(connection).await;
                }
                Some(intent) = self.unregister_rx.recv() => {
                    self.handle_unregister(intent).await;
                }
                Some(message) = self.broadcast_rx.recv() => {
                    self.handle_broadcast(message).await;
                }
            }
        }
        info!("hub stopped");
    }

    async fn handle_register(&mut self, connection: Connection) {
        info!("client connected: {}", connection.username());
        let username = connection.username().to_string();
        self.members.insert(connection.id(), connection);
        self.log_connection(&username, EventKind::Connected).await;
    }

    async fn handle_unregister(&mut self, intent: Unregister) {
        if let Some(connection) = self.members.remove(&intent.id) {
            connection.close();
            info!("client disconnected: {}", connection.username());
        }
        // Fires even when the member was already gone, so a double
        // unregister records a second disconnect event.
        self.log_connection(&intent.username, EventKind::Disconnected)
            .await;
    }

    async fn handle_broadcast(&mut self, message: ChatMessage) {
        debug!("broadcasting message from {}", message.user);
        if let Err(e) = self.store.save_message(&message.user, &message.text).await {
            warn!("failed to save message from {}: {e}", message.user);
        }

        let mut dead = Vec::new();
        for connection in self.members.values() {
            if connection.send(message.clone()).is_err() {
                warn!("send to {} failed, evicting", connection.username());
                dead.push(connection.id());
            }
        }
        for id in dead {
            if let Some(connection) = self.members.remove(&id) {
                connection.close();
            }
        }
    }

    async fn handle_shutdown(&mut self) {
        info!("hub shutting down, disconnecting {} clients", self.members.len());
        for connection in self.members.values() {
            self.log_connection(connection.username(), EventKind::Disconnected)
                .await;
            connection.close();
        }
        self.members.clear();
    }

    async fn log_connection(&self, user: &str, kind: EventKind) {
        debug!("logging connection event: {user} - {}", kind.as_str());
        if let Err(e) = self.store.log_connection(user, kind).await {
            warn!("failed to log connection event for {user}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::hub::Outbound;
    use crate::server::ConnectionEvent;
    use crate::store::StoreError;

    /// Store double that records every call; optionally fails writes.
    #[derive(Default)]
    struct RecordingStore {
        fail_writes: bool,
        messages: Mutex<Vec<(String, String)>>,
        events: Mutex<Vec<(String, EventKind)>>,
    }

    impl RecordingStore {
        fn failing() -> Self {
            Self {
                fail_writes: true,
                ..Self::default()
            }
        }

        fn events(&self) -> Vec<(String, EventKind)> {
            self.events.lock().unwrap().clone()
        }

        fn message_count(&self) -> usize {
            self.messages.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatStore for RecordingStore {
        async fn save_message(&self, user: &str, text: &str) -> Result<(), StoreError> {
            self.messages
                .lock()
                .unwrap()
                .push((user.to_string(), text.to_string()));
            if self.fail_writes {
                return Err(StoreError::Unavailable("store down".to_string()));
            }
            Ok(())
        }

        async fn log_connection(&self, user: &str, kind: EventKind) -> Result<(), StoreError> {
            self.events.lock().unwrap().push((user.to_string(), kind));
            if self.fail_writes {
                return Err(StoreError::Unavailable("store down".to_string()));
            }
            Ok(())
        }

        async fn recent_messages(
            &self,
            _page: u32,
            _page_size: u32,
        ) -> Result<(Vec<ChatMessage>, i64), StoreError> {
            Ok((Vec::new(), 0))
        }

        async fn connection_history(&self) -> Result<Vec<ConnectionEvent>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn hub_task(store: Arc<RecordingStore>) -> (Hub, HubTask) {
        Hub::channel(store)
    }

    fn member(username: &str) -> (Connection, UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(username, tx), rx)
    }

    fn recv_message(rx: &mut UnboundedReceiver<Outbound>) -> ChatMessage {
        match rx.try_recv().unwrap() {
            Outbound::Message(message) => message,
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_membership_is_registers_minus_unregisters() {
        let store = Arc::new(RecordingStore::default());
        let (_hub, mut task) = hub_task(store.clone());

        let (alice, _rx_a) = member("alice");
        let (bob, _rx_b) = member("bob");
        let alice_id = alice.id();
        let bob_id = bob.id();

        task.handle_register(alice).await;
        task.handle_register(bob).await;
        assert_eq!(task.members.len(), 2);

        task.handle_unregister(Unregister {
            id: bob_id,
            username: "bob".to_string(),
        })
        .await;
        assert_eq!(task.members.len(), 1);
        assert!(task.members.contains_key(&alice_id));

        assert_eq!(
            store.events(),
            vec![
                ("alice".to_string(), EventKind::Connected),
                ("bob".to_string(), EventKind::Connected),
                ("bob".to_string(), EventKind::Disconnected),
            ]
        );
    }

    #[tokio::test]
    async fn test_double_unregister_is_harmless_but_audited() {
        let store = Arc::new(RecordingStore::default());
        let (_hub, mut task) = hub_task(store.clone());

        let (alice, _rx) = member("alice");
        let id = alice.id();
        task.handle_register(alice).await;

        for _ in 0..2 {
            task.handle_unregister(Unregister {
                id,
                username: "alice".to_string(),
            })
            .await;
        }

        assert!(task.members.is_empty());
        // Second unregister is a membership no-op but still audited.
        assert_eq!(
            store.events(),
            vec![
                ("alice".to_string(), EventKind::Connected),
                ("alice".to_string(), EventKind::Disconnected),
                ("alice".to_string(), EventKind::Disconnected),
            ]
        );
    }

    #[tokio::test]
    async fn test_broadcast_delivers_one_copy_per_member() {
        let store = Arc::new(RecordingStore::default());
        let (_hub, mut task) = hub_task(store.clone());

        let (alice, mut rx_a) = member("alice");
        let (bob, mut rx_b) = member("bob");
        task.handle_register(alice).await;
        task.handle_register(bob).await;

        task.handle_broadcast(ChatMessage::now("alice", "hi")).await;

        for rx in [&mut rx_a, &mut rx_b] {
            let message = recv_message(rx);
            assert_eq!(message.user, "alice");
            assert_eq!(message.text, "hi");
            assert!(rx.try_recv().is_err(), "exactly one copy per member");
        }
        assert_eq!(store.message_count(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_evicts_member() {
        let store = Arc::new(RecordingStore::default());
        let (_hub, mut task) = hub_task(store.clone());

        let (alice, mut rx_a) = member("alice");
        let (bob, rx_b) = member("bob");
        task.handle_register(alice).await;
        task.handle_register(bob).await;

        // Bob's writer task is gone; the next broadcast evicts him.
        drop(rx_b);
        task.handle_broadcast(ChatMessage::now("alice", "one")).await;
        assert_eq!(task.members.len(), 1);

        // A subsequent broadcast no longer attempts delivery to bob.
        task.handle_broadcast(ChatMessage::now("alice", "two")).await;
        assert_eq!(recv_message(&mut rx_a).text, "one");
        assert_eq!(recv_message(&mut rx_a).text, "two");
        assert_eq!(store.message_count(), 2);
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_block_delivery() {
        let store = Arc::new(RecordingStore::failing());
        let (_hub, mut task) = hub_task(store.clone());

        let (alice, mut rx) = member("alice");
        task.handle_register(alice).await;

        task.handle_broadcast(ChatMessage::now("alice", "hi")).await;
        assert_eq!(recv_message(&mut rx).text, "hi");
        assert_eq!(task.members.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_everyone() {
        let store = Arc::new(RecordingStore::default());
        let (_hub, mut task) = hub_task(store.clone());

        let (alice, mut rx_a) = member("alice");
        let (bob, mut rx_b) = member("bob");
        task.handle_register(alice).await;
        task.handle_register(bob).await;

        task.handle_shutdown().await;
        assert!(task.members.is_empty());
        assert!(matches!(rx_a.try_recv().unwrap(), Outbound::Close));
        assert!(matches!(rx_b.try_recv().unwrap(), Outbound::Close));

        let disconnects = store
            .events()
            .iter()
            .filter(|(_, kind)| *kind == EventKind::Disconnected)
            .count();
        assert_eq!(disconnects, 2);

        // A second shutdown finds an empty set and must not panic.
        task.handle_shutdown().await;
        assert!(task.members.is_empty());
    }
}
