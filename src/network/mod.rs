//! Network layer
//!
//! The hyper front end that clients talk to, and the client that forwards
//! recorded requests to the real service.

mod client;
mod connection_pool;
mod server;

pub use client::HttpClient;
pub use connection_pool::{ConnectionGuard, ConnectionPool};
pub use server::ScriptServer;

/// Graceful shutdown timeout
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;
