//! Chat message wire format for the relay.
//!
//! Clients exchange JSON objects over WebSocket text frames. The relay only
//! looks at two fields: `type`, which must be [`CHAT_MESSAGE_TYPE`], and
//! `room`, which must match the room the sender joined. Every other field is
//! opaque and passed through unmodified, in its original order.

use serde_json::{Map, Value};

/// The `type` tag a payload must carry to be relayed.
pub const CHAT_MESSAGE_TYPE: &str = "chat-message";

/// Reasons a payload is dropped instead of relayed.
///
/// None of these are ever reported back to the sender; they exist for
/// diagnostics and tests only.
#[derive(Debug, thiserror::Error)]
pub enum MalformedPayload {
    /// The frame was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame parsed, but not to a JSON object.
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// The `type` field is missing or is not `chat-message`.
    #[error("unexpected message type: {}", .found.as_deref().unwrap_or("<missing>"))]
    UnexpectedType {
        /// The `type` value that was found, rendered as JSON.
        found: Option<String>,
    },

    /// The `room` field is missing or is not a string.
    #[error("payload has no string `room` field")]
    MissingRoom,

    /// The declared room differs from the room the sender joined.
    #[error("declared room {declared:?} does not match joined room {joined:?}")]
    RoomMismatch {
        /// Room named in the payload.
        declared: String,
        /// Room the sending connection was assigned at connect time.
        joined: String,
    },

    /// The frame exceeds the configured size limit.
    #[error("payload too large: {size} bytes (max {max})")]
    TooLarge {
        /// Size of the rejected frame in bytes.
        size: usize,
        /// Configured limit in bytes.
        max: usize,
    },
}

impl MalformedPayload {
    /// Whether the frame could not be read as a JSON object at all.
    ///
    /// These are worth a warning; a readable object that simply is not a
    /// relayable chat message is routine.
    #[must_use]
    pub const fn is_unreadable(&self) -> bool {
        matches!(
            self,
            Self::Json(_) | Self::NotAnObject | Self::TooLarge { .. }
        )
    }
}

/// A validated `chat-message` payload.
///
/// Holds the complete inbound object so it can be re-serialized exactly as
/// received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    room: String,
    fields: Map<String, Value>,
}

impl ChatMessage {
    /// The room this message declares.
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// All fields of the message, including `type` and `room`.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Checks that the declared room is the room the sender joined.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload::RoomMismatch`] when the rooms differ.
    pub fn authorize(&self, joined_room: &str) -> Result<(), MalformedPayload> {
        if self.room == joined_room {
            Ok(())
        } else {
            Err(MalformedPayload::RoomMismatch {
                declared: self.room.clone(),
                joined: joined_room.to_string(),
            })
        }
    }
}

impl TryFrom<Value> for ChatMessage {
    type Error = MalformedPayload;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(fields) = value else {
            return Err(MalformedPayload::NotAnObject);
        };

        match fields.get("type") {
            Some(Value::String(tag)) if tag == CHAT_MESSAGE_TYPE => {}
            other => {
                return Err(MalformedPayload::UnexpectedType {
                    found: other.map(ToString::to_string),
                });
            }
        }

        let Some(Value::String(room)) = fields.get("room") else {
            return Err(MalformedPayload::MissingRoom);
        };
        let room = room.clone();

        Ok(Self { room, fields })
    }
}

/// Decodes a raw frame into a [`ChatMessage`].
///
/// # Errors
///
/// Returns [`MalformedPayload`] if the bytes are not JSON or the object is
/// not a well-formed chat message.
pub fn decode(bytes: &[u8]) -> Result<ChatMessage, MalformedPayload> {
    let value: Value = serde_json::from_slice(bytes)?;
    ChatMessage::try_from(value)
}

/// Re-serializes a [`ChatMessage`] to the JSON text sent to recipients.
///
/// # Errors
///
/// Returns [`MalformedPayload::Json`] if serialization fails.
pub fn encode(msg: &ChatMessage) -> Result<String, MalformedPayload> {
    Ok(serde_json::to_string(&msg.fields)?)
}
