//! The `transport` module is responsible for the client-facing WebSocket
//! endpoint.
//!
//! It defines the inbound frame format, the per-connection reader that feeds
//! the hub, and the server that accepts connections and runs their writer
//! tasks.

mod http;
pub mod message;
pub mod reader;
pub mod websocket;

pub use message::InboundFrame;
pub use reader::{ConnectionReader, ReaderExit, ReaderState};
pub use websocket::WebSocketServer;

#[cfg(test)]
mod websocket_tests;
