//! The `client` module defines how the hub represents a connected client.
//!
//! It provides `Connection`, the handle stored in the registry, and
//! `ConnectionId`, the identity used in logs and registry lookups.

pub mod connection;
pub use connection::{Connection, ConnectionId};
