//! Chat relay library
//!
//! Clients connect over WebSocket, send text messages, and receive every
//! message broadcast to all currently connected clients. Messages and
//! connection events are durably recorded through a pluggable store.

pub mod config;
pub mod hub;
pub mod server;
pub mod store;
