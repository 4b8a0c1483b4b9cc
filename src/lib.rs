//! # chathub
//!
//! `chathub` relays real-time chat messages between WebSocket clients and a
//! persistence backend. Every message a client sends is forwarded to the
//! persistence endpoint (best-effort) and broadcast to every connected client,
//! whether or not it was stored.
//!
//! ## Core Modules
//!
//! - `hub`: the registry of open connections, the bounded inbound queue and the dispatcher that fans messages out.
//! - `client`: the `Connection` handle the registry stores for each live session.
//! - `relay`: the HTTP client for the persistence endpoint.
//! - `transport`: the WebSocket server, per-connection readers and writers.
//! - `config`: layered configuration loading.
//! - `utils`: the error taxonomy and logging setup.

pub mod client;
pub mod config;
pub mod hub;
pub mod relay;
pub mod transport;
pub mod utils;
