//! Chat relay server library.
//!
//! Exposes the relay server for use in tests and embedding.
//! The relay accepts WebSocket connections, assigns each to a room, and
//! rebroadcasts chat messages to the other connections in the same room.

pub mod config;
pub mod registry;
pub mod relay;
