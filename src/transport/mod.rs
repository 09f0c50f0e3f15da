//! Transport abstraction for chain node connections.
//!
//! Provides a trait-based interface over the node wire protocol, allowing the
//! WebSocket JSON-RPC client and test doubles to be used interchangeably.

mod mock;
mod rpc;
mod ws;

pub use mock::{FailingTransport, MockTransport};
pub use rpc::RuntimeVersion;
pub use ws::{WsConnection, WsTransport};

use crate::config::Endpoint;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Read-only diagnostics about a remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    /// Chain name as reported by `system_chain`.
    pub chain: String,
    /// Node implementation version as reported by `system_version`.
    pub version: String,
}

/// Opens raw connections to chain nodes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a socket-level connection to the endpoint.
    ///
    /// The returned connection is not necessarily usable until
    /// [`RawConnection::await_ready`] has completed.
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn RawConnection>>;
}

/// A socket-level connection to a chain node.
#[async_trait]
pub trait RawConnection: Send + Sync {
    /// Waits until the node has completed its handshake and metadata load.
    async fn await_ready(&self) -> Result<()>;

    /// Closes the connection. Closing an already closed connection is a no-op.
    async fn close(&self) -> Result<()>;

    /// Returns true while the underlying socket is open.
    fn is_live(&self) -> bool;

    /// Returns the chain name.
    async fn chain(&self) -> Result<String>;

    /// Returns the node implementation version.
    async fn node_version(&self) -> Result<String>;
}
