//! por-link - Shared Substrate node session for the Proof of Reserve dashboard.
//!
//! The library exposes the connection manager, the transport seam it drives,
//! and the small reserve helpers the dashboard computes locally.

pub mod config;
pub mod connection;
pub mod display;
pub mod error;
pub mod logging;
pub mod peg;
pub mod transport;
