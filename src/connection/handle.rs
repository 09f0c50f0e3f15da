//! Connection handle and session state types.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::Endpoint;
use crate::error::Result;
use crate::transport::{NodeInfo, RawConnection};

/// An established, fully negotiated session with a chain node.
///
/// Owned by the connection manager and shared with consumers behind an `Arc`.
/// Consumers can query through it but cannot close it.
pub struct ConnectionHandle {
    endpoint: Endpoint,
    raw: Box<dyn RawConnection>,
    node: Option<NodeInfo>,
    ready_at: Instant,
}

impl ConnectionHandle {
    pub(crate) fn new(endpoint: Endpoint, raw: Box<dyn RawConnection>, node: Option<NodeInfo>) -> Self {
        Self {
            endpoint,
            raw,
            node,
            ready_at: Instant::now(),
        }
    }

    /// The endpoint this session was opened against.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Node diagnostics read when the session became ready, if available.
    pub fn node_info(&self) -> Option<&NodeInfo> {
        self.node.as_ref()
    }

    /// Returns true while the underlying connection is open.
    pub fn is_live(&self) -> bool {
        self.raw.is_live()
    }

    /// Time since the session became ready.
    pub fn uptime(&self) -> Duration {
        self.ready_at.elapsed()
    }

    /// Queries the chain name from the node.
    pub async fn chain(&self) -> Result<String> {
        self.raw.chain().await
    }

    /// Queries the node implementation version.
    pub async fn node_version(&self) -> Result<String> {
        self.raw.node_version().await
    }

    pub(crate) async fn close(&self) -> Result<()> {
        self.raw.close().await
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("endpoint", &self.endpoint.display_string())
            .field("node", &self.node)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Session state derived from the manager's handle and attempt slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No live handle and no attempt in flight.
    Disconnected,
    /// An attempt is in flight.
    Connecting,
    /// A live handle is available.
    Connected,
}

impl SessionState {
    /// Returns the state as a display label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the session for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Current state.
    pub state: SessionState,
    /// Endpoint of the live handle or the in-flight attempt.
    pub endpoint: Option<String>,
    /// Node diagnostics of the live handle.
    pub node: Option<NodeInfo>,
    /// Message of the most recent failed attempt.
    pub last_error: Option<String>,
}
