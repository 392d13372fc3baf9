//! Shared wire format for the chat relay.

pub mod chat;
pub mod room;
