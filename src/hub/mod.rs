//! The `hub` module is the core of the relay: the registry of open
//! connections, the bounded inbound queue, and the dispatcher that fans every
//! queued message out to all registered connections.

pub mod engine;
pub mod message;
pub mod registry;

pub use engine::{BroadcastReport, Dispatcher, Hub, Submission};
pub use message::{ChatMessage, Envelope};
pub use registry::Registry;
