//! Event fan-out to connected clients.
//!
//! Each connection registers an mpsc sender; its socket writer task drains the
//! other end. Broadcasts serialize the event once and share the string across
//! receivers, and a full queue drops the message for that client instead of
//! blocking anyone else.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::protocol::ServerEvent;

/// Outbound queue depth per connection.
pub const OUTBOUND_BUFFER: usize = 64;

/// Registry of live connections and their outbound queues.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<Uuid, mpsc::Sender<Arc<String>>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: Uuid, tx: mpsc::Sender<Arc<String>>) {
        self.connections.write().insert(connection_id, tx);
    }

    pub fn unregister(&self, connection_id: Uuid) {
        self.connections.write().remove(&connection_id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Send to one connection. Unknown ids and full queues are dropped.
    pub fn send_to(&self, connection_id: Uuid, event: &ServerEvent) {
        let Some(payload) = serialize(event) else {
            return;
        };
        let connections = self.connections.read();
        if let Some(tx) = connections.get(&connection_id) {
            if tx.try_send(payload).is_err() {
                warn!(%connection_id, "outbound queue full, dropping event");
            }
        }
    }

    /// Fan the event out to every connection.
    pub fn broadcast(&self, event: &ServerEvent) {
        let Some(payload) = serialize(event) else {
            return;
        };
        let connections = self.connections.read();
        let mut recipients = 0usize;
        for (connection_id, tx) in connections.iter() {
            if tx.try_send(Arc::clone(&payload)).is_ok() {
                recipients += 1;
            } else {
                warn!(%connection_id, "outbound queue full, dropping broadcast");
            }
        }
        debug!(recipients, "broadcast event");
    }
}

fn serialize(event: &ServerEvent) -> Option<Arc<String>> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Arc::new(json)),
        Err(error) => {
            warn!(%error, "failed to serialize outbound event");
            None
        }
    }
}
