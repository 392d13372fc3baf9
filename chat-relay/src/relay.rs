//! Relay server core: shared state, WebSocket handler, and room fan-out.
//!
//! The relay accepts WebSocket connections, assigns each one to the room
//! named in its `room` query parameter, and rebroadcasts every valid
//! `chat-message` to the other connections in that room. Nothing is stored.
//! Malformed frames are logged and dropped; the sender is never told.

use std::future::Future;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use chat_relay_proto::chat::{self, ChatMessage, MalformedPayload};
use chat_relay_proto::room;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::registry::{ConnectionId, ConnectionRegistry};

/// What happened to an inbound frame.
#[derive(Debug)]
pub enum Disposition {
    /// The message was valid and handed to `recipients` other connections.
    Broadcast {
        /// Number of connections the frame was queued for.
        recipients: usize,
    },
    /// The frame was discarded.
    Dropped(MalformedPayload),
}

/// Shared relay server state holding the connection registry.
pub struct RelayState {
    /// Live connections and their rooms.
    pub registry: ConnectionRegistry,
    /// Frames larger than this are dropped. `None` leaves the limit to the
    /// WebSocket transport.
    max_message_size: Option<usize>,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a relay state with an empty registry and no frame size limit
    /// beyond the transport's own.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(None)
    }

    /// Creates a relay state with an optional frame size limit.
    #[must_use]
    pub fn with_config(max_message_size: Option<usize>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            max_message_size,
        }
    }

    /// Registers a new connection under the room named by `query`.
    ///
    /// A missing or empty `room` parameter assigns [`room::DEFAULT_ROOM`].
    pub fn accept_connection(
        &self,
        query: Option<&str>,
        sender: mpsc::UnboundedSender<Message>,
    ) -> (ConnectionId, String) {
        let room = room::room_from_query(query);
        let conn_id = self.registry.register(room.clone(), sender);
        tracing::info!(conn_id = %conn_id, room = %room, "connection joined room");
        (conn_id, room)
    }

    /// Handles one inbound frame from `conn_id`, which joined `joined_room`.
    ///
    /// Valid chat messages for the sender's own room are broadcast; anything
    /// else is dropped. Unparseable frames are logged at `warn`, schema
    /// mismatches at `debug`.
    pub fn on_message(&self, conn_id: ConnectionId, joined_room: &str, raw: &[u8]) -> Disposition {
        let result = match self.max_message_size {
            Some(max) if raw.len() > max => Err(MalformedPayload::TooLarge {
                size: raw.len(),
                max,
            }),
            _ => chat::decode(raw).and_then(|msg| msg.authorize(joined_room).map(|()| msg)),
        };

        match result {
            Ok(msg) => {
                let recipients = self.broadcast(joined_room, &msg, conn_id);
                Disposition::Broadcast { recipients }
            }
            Err(e) => {
                if e.is_unreadable() {
                    tracing::warn!(conn_id = %conn_id, error = %e, "invalid payload");
                } else {
                    tracing::debug!(conn_id = %conn_id, reason = %e, "payload not relayed");
                }
                Disposition::Dropped(e)
            }
        }
    }

    /// Sends `msg` to every open connection in `room` except `exclude`.
    ///
    /// Returns the number of connections the frame was queued for.
    pub fn broadcast(&self, room: &str, msg: &ChatMessage, exclude: ConnectionId) -> usize {
        let text = match chat::encode(msg) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode chat message for broadcast");
                return 0;
            }
        };
        let frame = Message::Text(text.into());

        let mut delivered = 0;
        for (conn_id, conn) in self.registry.recipients(room, exclude) {
            if conn.send(frame.clone()) {
                delivered += 1;
            } else {
                tracing::debug!(conn_id = %conn_id, "recipient closed during broadcast");
            }
        }

        tracing::debug!(room = %room, from = %exclude, recipients = delivered, "broadcast");
        delivered
    }

    /// Removes a connection from the registry.
    ///
    /// Returns `true` if the connection was registered.
    pub fn on_disconnect(&self, conn_id: ConnectionId) -> bool {
        self.registry.unregister(conn_id).is_some()
    }

    /// Number of live connections across all rooms.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Send a WebSocket Close frame to all connections.
    pub fn close_all_connections(&self) {
        if self.registry.is_empty() {
            tracing::debug!("no connections to close");
            return;
        }
        self.registry.close_all();
    }
}

/// Handles an upgraded WebSocket connection.
///
/// The connection lifecycle:
/// 1. Register under the room from the request query.
/// 2. Spawn a writer task draining the connection's channel to the socket.
/// 3. Read frames and hand each to [`RelayState::on_message`].
/// 4. On close or transport error, unregister.
pub async fn handle_socket(socket: WebSocket, query: Option<String>, state: Arc<RelayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let (conn_id, room) = state.accept_connection(query.as_deref(), tx);

    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn_id = %conn_id, "WebSocket write failed");
                break;
            }
        }
    });

    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    reader_state.on_message(conn_id, &room, text.as_str().as_bytes());
                }
                Message::Binary(data) => {
                    reader_state.on_message(conn_id, &room, &data);
                }
                Message::Close(_) => {
                    tracing::debug!(conn_id = %conn_id, "received close frame");
                    break;
                }
                _ => {
                    // Pings are answered by axum; pongs need no action.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.on_disconnect(conn_id);
    tracing::info!(conn_id = %conn_id, "connection closed and unregistered");
}

/// Builds the router. WebSocket upgrades are accepted on any path.
pub fn router(state: Arc<RelayState>) -> axum::Router {
    axum::Router::new()
        .route("/", axum::routing::get(ws_handler))
        .route("/{*path}", axum::routing::get(ws_handler))
        .with_state(state)
}

/// Starts the relay server on the given address and returns the bound address
/// and a join handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-configured [`RelayState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_shutdown(addr, state, std::future::pending()).await
}

/// Starts the relay server and stops it when `shutdown` resolves.
///
/// On shutdown every open connection is sent a Close frame and the listener
/// stops accepting; the returned handle completes once the server has exited.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_shutdown<F>(
    addr: &str,
    state: Arc<RelayState>,
    shutdown: F,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let shutdown = async move {
            shutdown.await;
            tracing::info!(
                connections = state.connection_count(),
                "shutting down, closing connections"
            );
            state.close_all_connections();
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Starts the relay server in-process for testing.
///
/// Binds to `127.0.0.1:0` (OS-assigned port) and returns the bound address
/// and a [`tokio::task::JoinHandle`] for cleanup.
#[cfg(test)]
pub async fn start_test_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server")
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    RawQuery(query): RawQuery,
    State(state): State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, query, state))
}
