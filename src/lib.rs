//! Signaling relay: forwards every WebSocket message to all other connected peers.

pub mod config;
pub mod relay;
