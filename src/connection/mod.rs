//! Connection management for the chain node session.
//!
//! Centralizes the session lifecycle: connect, coalescing, teardown.

pub mod handle;
pub mod manager;

pub use handle::{ConnectionHandle, SessionState, SessionStatus};
pub use manager::ConnectionManager;
