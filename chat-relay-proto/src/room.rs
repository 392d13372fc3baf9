//! Room assignment from the connection request.
//!
//! A client picks its room with the `room` query parameter of the WebSocket
//! URL (`ws://host:8787/?room=lobby`). The room is fixed for the lifetime of
//! the connection.

use url::form_urlencoded;

/// Room assigned when the request names none.
pub const DEFAULT_ROOM: &str = "default";

/// Extracts the room from a raw query string.
///
/// Uses the first `room` parameter, percent- and plus-decoded. A missing
/// query, a missing parameter, or an empty value all yield [`DEFAULT_ROOM`].
#[must_use]
pub fn room_from_query(query: Option<&str>) -> String {
    query
        .and_then(|q| {
            form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == "room")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|room| !room.is_empty())
        .unwrap_or_else(|| DEFAULT_ROOM.to_string())
}
