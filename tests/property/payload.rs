//! Property-based tests for the chat wire format.
//!
//! Uses proptest to verify:
//! 1. Random bytes never cause a panic in `decode` (returns `Err` gracefully).
//! 2. Any non-empty room survives URL query encoding and `room_from_query`.
//! 3. Arbitrary extra fields survive decode → encode byte-for-byte.
//! 4. A message is authorized for its own room and no other.

use chat_relay_proto::chat::{self, ChatMessage};
use chat_relay_proto::room::{DEFAULT_ROOM, room_from_query};
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for generating arbitrary JSON leaf values.
fn arb_json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[^\x00]{0,32}".prop_map(Value::from),
    ]
}

/// Strategy for generating extra payload fields (never `type` or `room`).
fn arb_extra_fields() -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::vec(("[a-z]{1,12}", arb_json_leaf()), 0..8).prop_map(|fields| {
        fields
            .into_iter()
            .filter(|(key, _)| key != "type" && key != "room")
            .collect()
    })
}

/// Builds a chat message for `room` carrying `extra` fields after the
/// routing fields.
fn chat_message(room: &str, extra: Vec<(String, Value)>) -> ChatMessage {
    let mut fields = Map::new();
    fields.insert("type".to_string(), Value::from(chat::CHAT_MESSAGE_TYPE));
    fields.insert("room".to_string(), Value::from(room));
    fields.extend(extra);
    ChatMessage::try_from(Value::Object(fields)).unwrap()
}

proptest! {
    #[test]
    fn decode_random_bytes_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = chat::decode(&bytes);
    }

    #[test]
    fn room_survives_query_encoding(room in "[^\x00]{1,64}") {
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("room", &room)
            .finish();
        prop_assert_eq!(room_from_query(Some(&query)), room);
    }

    #[test]
    fn query_without_room_is_default(key in "[a-qs-z]{1,8}", value in "[a-z0-9]{0,16}") {
        let query = format!("{key}={value}");
        prop_assert_eq!(room_from_query(Some(&query)), DEFAULT_ROOM);
    }

    #[test]
    fn extra_fields_survive_relay_encoding(room in "[^\x00]{1,32}", extra in arb_extra_fields()) {
        let msg = chat_message(&room, extra);

        let text = chat::encode(&msg).unwrap();
        let decoded = chat::decode(text.as_bytes()).unwrap();

        prop_assert_eq!(decoded.room(), room.as_str());
        prop_assert_eq!(chat::encode(&decoded).unwrap(), text);
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn message_authorized_only_for_declared_room(room in "[a-z]{1,16}", other in "[A-Z]{1,16}") {
        let msg = chat_message(&room, Vec::new());
        prop_assert!(msg.authorize(&room).is_ok());
        prop_assert!(msg.authorize(&other).is_err());
    }
}
