//! Connection registry for the relay server.
//!
//! Tracks every live WebSocket connection together with the room it joined.
//! Entries are ephemeral and lost on restart. The registry is owned by
//! [`crate::relay::RelayState`]; there is no global instance.
//!
//! The lock is a synchronous [`RwLock`] and is never held across an `.await`,
//! so registration, removal, and broadcast snapshots are serialized the same
//! way they would be in a single-threaded event loop.

use std::collections::HashMap;
use std::fmt;

use axum::extract::ws::Message;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque identifier for a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a new time-ordered connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered connection: its room and the channel feeding its socket writer.
#[derive(Debug, Clone)]
pub struct Connection {
    room: String,
    sender: mpsc::UnboundedSender<Message>,
}

impl Connection {
    /// The room this connection joined.
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Whether the socket writer behind this connection is still running.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queues a frame for the socket writer.
    ///
    /// Returns `false` if the writer has already shut down.
    pub fn send(&self, msg: Message) -> bool {
        self.sender.send(msg).is_ok()
    }
}

/// In-memory set of live connections keyed by [`ConnectionId`].
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection in `room` and returns its new id.
    pub fn register(
        &self,
        room: impl Into<String>,
        sender: mpsc::UnboundedSender<Message>,
    ) -> ConnectionId {
        let id = ConnectionId::new();
        let conn = Connection {
            room: room.into(),
            sender,
        };
        self.connections.write().insert(id, conn);
        id
    }

    /// Removes a connection, returning it if it was registered.
    pub fn unregister(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.write().remove(&id)
    }

    /// Returns the room a connection joined, if it is registered.
    #[cfg(test)]
    pub(crate) fn room_of(&self, id: ConnectionId) -> Option<String> {
        self.connections.read().get(&id).map(|c| c.room.clone())
    }

    /// Number of registered connections across all rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Snapshot of the open connections in `room`, excluding `exclude`.
    ///
    /// Walks the whole registry. The snapshot is taken under the read lock;
    /// connections that join or leave afterwards are not reflected.
    #[must_use]
    pub fn recipients(&self, room: &str, exclude: ConnectionId) -> Vec<(ConnectionId, Connection)> {
        self.connections
            .read()
            .iter()
            .filter(|(id, c)| **id != exclude && c.room == room && c.is_open())
            .map(|(id, c)| (*id, c.clone()))
            .collect()
    }

    /// Sends a Close frame to every registered connection.
    pub fn close_all(&self) {
        let conns = self.connections.read();
        for (id, conn) in conns.iter() {
            tracing::info!(conn_id = %id, room = %conn.room(), "sending close frame");
            if !conn.send(Message::Close(None)) {
                tracing::debug!(conn_id = %id, "writer already closed, skipping close frame");
            }
        }
    }
}
