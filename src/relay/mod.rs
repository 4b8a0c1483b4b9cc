//! The `relay` module forwards every inbound chat message to the external
//! persistence endpoint.
//!
//! Persistence is best-effort: a failed relay is logged and the message is
//! broadcast anyway. `RelayClient` does one HTTP round trip; `Relay` decides
//! whether the reader waits for it or hands it to a bounded background pool.

pub mod client;
pub mod record;

pub use client::{Relay, RelayClient, RelayError};
pub use record::{Confirmation, PersistRequest, StoredMessage};
