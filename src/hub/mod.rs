//! Connection hub module
//!
//! Owns the set of live connections and serializes all membership
//! mutation, broadcast fan-out, and persistence triggers through a single
//! consumer loop.

mod connection;
mod hub;

pub use connection::*;
pub use hub::*;
