//! Shared building blocks: the hub error taxonomy and logging setup.

pub mod error;
pub mod logging;
