//! Mock transports for testing.
//!
//! Provides in-memory transports with configurable latency and failures so the
//! connection manager can be exercised without a chain node.

use super::{NodeInfo, RawConnection, Transport};
use crate::config::Endpoint;
use crate::error::{PorError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct MockStats {
    opens: AtomicUsize,
    closes: AtomicUsize,
    connections: Mutex<Vec<Arc<AtomicBool>>>,
}

/// A transport that simulates a chain node.
///
/// Clones share their counters, so a test can keep one clone for assertions
/// and hand another to the manager.
#[derive(Clone)]
pub struct MockTransport {
    open_delay: Duration,
    ready_delay: Duration,
    open_error: Option<String>,
    failing_opens: usize,
    ready_error: Option<String>,
    never_ready: bool,
    node: NodeInfo,
    stats: Arc<MockStats>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a transport that connects instantly.
    pub fn new() -> Self {
        Self {
            open_delay: Duration::ZERO,
            ready_delay: Duration::ZERO,
            open_error: None,
            failing_opens: 0,
            ready_error: None,
            never_ready: false,
            node: NodeInfo {
                chain: "Development".to_string(),
                version: "4.0.0-dev".to_string(),
            },
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Delays every `open` call.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Delays the readiness signal after open.
    pub fn with_ready_delay(mut self, delay: Duration) -> Self {
        self.ready_delay = delay;
        self
    }

    /// Makes every `open` call fail with the given message.
    pub fn failing_open(self, message: impl Into<String>) -> Self {
        self.failing_first_opens(usize::MAX, message)
    }

    /// Makes the first `count` calls to `open` fail with the given message.
    pub fn failing_first_opens(mut self, count: usize, message: impl Into<String>) -> Self {
        self.open_error = Some(message.into());
        self.failing_opens = count;
        self
    }

    /// Makes the readiness wait fail with the given message.
    pub fn failing_ready(mut self, message: impl Into<String>) -> Self {
        self.ready_error = Some(message.into());
        self
    }

    /// Makes the readiness signal never arrive.
    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    /// Reports the given node diagnostics.
    pub fn with_node_info(mut self, chain: impl Into<String>, version: impl Into<String>) -> Self {
        self.node = NodeInfo {
            chain: chain.into(),
            version: version.into(),
        };
        self
    }

    /// Number of `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.stats.opens.load(Ordering::SeqCst)
    }

    /// Number of connections closed so far.
    pub fn close_count(&self) -> usize {
        self.stats.closes.load(Ordering::SeqCst)
    }

    /// Simulates the node dropping every open connection.
    pub fn drop_connections(&self) {
        let connections = self
            .stats
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for live in connections.iter() {
            live.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _endpoint: &Endpoint) -> Result<Box<dyn RawConnection>> {
        let call = self.stats.opens.fetch_add(1, Ordering::SeqCst);

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        if let Some(message) = &self.open_error {
            if call < self.failing_opens {
                return Err(PorError::transport(message.clone()));
            }
        }

        let live = Arc::new(AtomicBool::new(true));
        self.stats
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&live));

        Ok(Box::new(MockConnection {
            ready_delay: self.ready_delay,
            ready_error: self.ready_error.clone(),
            never_ready: self.never_ready,
            node: self.node.clone(),
            live,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MockConnection {
    ready_delay: Duration,
    ready_error: Option<String>,
    never_ready: bool,
    node: NodeInfo,
    live: Arc<AtomicBool>,
    stats: Arc<MockStats>,
}

#[async_trait]
impl RawConnection for MockConnection {
    async fn await_ready(&self) -> Result<()> {
        if self.never_ready {
            std::future::pending::<()>().await;
        }
        if !self.ready_delay.is_zero() {
            tokio::time::sleep(self.ready_delay).await;
        }
        match &self.ready_error {
            Some(message) => Err(PorError::transport(message.clone())),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        if self.live.swap(false, Ordering::SeqCst) {
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn chain(&self) -> Result<String> {
        Ok(self.node.chain.clone())
    }

    async fn node_version(&self) -> Result<String> {
        Ok(self.node.version.clone())
    }
}

/// A transport whose `open` always fails.
pub struct FailingTransport {
    message: String,
}

impl FailingTransport {
    /// Creates a transport that fails with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn open(&self, _endpoint: &Endpoint) -> Result<Box<dyn RawConnection>> {
        Err(PorError::transport(self.message.clone()))
    }
}
