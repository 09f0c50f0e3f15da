//! Connection manager for the shared chain node session.
//!
//! Holds at most one live handle and at most one in-flight attempt. Concurrent
//! `connect` calls join the in-flight attempt instead of opening a second
//! transport.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::handle::{ConnectionHandle, SessionState, SessionStatus};
use crate::config::{ConnectionSettings, Endpoint};
use crate::error::{PorError, Result};
use crate::transport::{NodeInfo, RawConnection, Transport};

type AttemptFuture = Shared<BoxFuture<'static, Result<Arc<ConnectionHandle>>>>;

/// The in-flight attempt slot.
struct PendingAttempt {
    generation: u64,
    endpoint: String,
    future: AttemptFuture,
    /// Set by `disconnect`; the attempt closes its connection instead of installing it.
    teardown: bool,
}

#[derive(Default)]
struct SessionInner {
    handle: Option<Arc<ConnectionHandle>>,
    attempt: Option<PendingAttempt>,
    generation: u64,
    last_error: Option<PorError>,
}

/// Manages the shared session with a chain node.
///
/// Clones share the same session; construct separate instances for separate
/// sessions.
#[derive(Clone)]
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    settings: Arc<ConnectionSettings>,
    inner: Arc<Mutex<SessionInner>>,
}

impl ConnectionManager {
    /// Creates a disconnected manager.
    pub fn new(transport: Arc<dyn Transport>, settings: ConnectionSettings) -> Self {
        Self {
            transport,
            settings: Arc::new(settings),
            inner: Arc::new(Mutex::new(SessionInner::default())),
        }
    }

    /// Returns the manager settings.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Returns a ready session, connecting if needed.
    ///
    /// Uses the default endpoint when `endpoint` is `None`. An existing live
    /// session is returned as is, and an attempt already in flight is joined.
    ///
    /// # Errors
    /// Returns `PorError::Connection` if the node cannot be reached or never
    /// signals readiness. The failure is not sticky: the next call starts a
    /// new attempt.
    pub async fn connect(&self, endpoint: Option<&str>) -> Result<Arc<ConnectionHandle>> {
        let requested = endpoint.unwrap_or(&self.settings.default_endpoint).trim();

        let attempt = {
            let mut inner = self.lock();

            if let Some(handle) = inner.handle.as_ref().filter(|h| h.is_live()) {
                if handle.endpoint().as_str() != requested {
                    warn!(
                        requested,
                        active = %handle.endpoint(),
                        "Session already open on another endpoint; reusing it"
                    );
                }
                return Ok(Arc::clone(handle));
            }

            match inner.attempt.as_ref() {
                Some(pending) => {
                    if pending.endpoint != requested {
                        warn!(
                            requested,
                            pending = %pending.endpoint,
                            "Attempt already in flight for another endpoint; joining it"
                        );
                    }
                    debug!(generation = pending.generation, "Joining in-flight connection attempt");
                    pending.future.clone()
                }
                None => {
                    let stale = inner.handle.take();
                    self.start_attempt(&mut inner, requested, stale)
                }
            }
        };

        attempt.await
    }

    /// Tears down the session.
    ///
    /// Calling it while disconnected is a no-op. An attempt in flight is not
    /// aborted: it is marked for teardown and awaited, its connection is closed
    /// as soon as it is ready, and its waiters receive a connection error.
    ///
    /// # Errors
    /// Returns the transport error if closing the connection fails. The
    /// manager is disconnected either way.
    pub async fn disconnect(&self) -> Result<()> {
        let pending = {
            let mut inner = self.lock();
            inner.attempt.as_mut().map(|attempt| {
                attempt.teardown = true;
                attempt.future.clone()
            })
        };

        if let Some(attempt) = pending {
            info!("Disconnect requested while connecting; waiting for the attempt to settle");
            let _ = attempt.await;
        }

        let handle = self.lock().handle.take();
        let Some(handle) = handle else {
            debug!("Disconnect called with no active session");
            return Ok(());
        };

        if let Err(e) = handle.close().await {
            warn!(endpoint = %handle.endpoint(), error = %e, "Error while closing session");
            return Err(e);
        }

        info!(endpoint = %handle.endpoint(), "Disconnected from chain node");
        Ok(())
    }

    /// Returns the live session, if any. Never touches the network.
    pub fn current_handle(&self) -> Option<Arc<ConnectionHandle>> {
        self.lock()
            .handle
            .as_ref()
            .filter(|h| h.is_live())
            .map(Arc::clone)
    }

    /// Returns true if a live session exists.
    pub fn is_connected(&self) -> bool {
        self.current_handle().is_some()
    }

    /// Returns the derived session state.
    pub fn state(&self) -> SessionState {
        let inner = self.lock();
        Self::derive_state(&inner)
    }

    /// Returns the most recent attempt failure, cleared when a new attempt starts.
    pub fn last_error(&self) -> Option<PorError> {
        self.lock().last_error.clone()
    }

    /// Returns a status snapshot for display.
    pub fn status(&self) -> SessionStatus {
        let inner = self.lock();
        let state = Self::derive_state(&inner);

        let live = inner.handle.as_ref().filter(|h| h.is_live());
        let endpoint = match (live, inner.attempt.as_ref()) {
            (Some(handle), _) => Some(handle.endpoint().to_string()),
            (None, Some(attempt)) => Some(attempt.endpoint.clone()),
            (None, None) => None,
        };

        SessionStatus {
            state,
            endpoint,
            node: live.and_then(|h| h.node_info().cloned()),
            last_error: inner.last_error.as_ref().map(|e| e.message().to_string()),
        }
    }

    fn derive_state(inner: &SessionInner) -> SessionState {
        if inner.handle.as_ref().is_some_and(|h| h.is_live()) {
            SessionState::Connected
        } else if inner.attempt.is_some() {
            SessionState::Connecting
        } else {
            SessionState::Disconnected
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers and spawns a new attempt. Called with the state lock held.
    fn start_attempt(
        &self,
        inner: &mut SessionInner,
        endpoint: &str,
        stale: Option<Arc<ConnectionHandle>>,
    ) -> AttemptFuture {
        inner.generation += 1;
        inner.last_error = None;
        let generation = inner.generation;

        debug!(generation, endpoint, "Starting connection attempt");

        // Spawned so the attempt runs to completion even if every caller stops waiting
        let task = tokio::spawn(run_attempt(
            Arc::clone(&self.transport),
            Arc::clone(&self.settings),
            Arc::clone(&self.inner),
            endpoint.to_string(),
            generation,
            stale,
        ));

        let state = Arc::clone(&self.inner);
        let future = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(generation, error = %e, "Connection attempt task failed");
                    let err = PorError::connection(format!("Connection attempt failed: {e}"));
                    let mut inner = state.lock().unwrap_or_else(PoisonError::into_inner);
                    if inner.attempt.as_ref().map(|a| a.generation) == Some(generation) {
                        inner.attempt = None;
                        inner.last_error = Some(err.clone());
                    }
                    Err(err)
                }
            }
        }
        .boxed()
        .shared();

        inner.attempt = Some(PendingAttempt {
            generation,
            endpoint: endpoint.to_string(),
            future: future.clone(),
            teardown: false,
        });

        future
    }
}

/// Body of a spawned attempt: establish, then settle the attempt slot.
async fn run_attempt(
    transport: Arc<dyn Transport>,
    settings: Arc<ConnectionSettings>,
    state: Arc<Mutex<SessionInner>>,
    endpoint: String,
    generation: u64,
    stale: Option<Arc<ConnectionHandle>>,
) -> Result<Arc<ConnectionHandle>> {
    if let Some(stale) = stale {
        debug!(endpoint = %stale.endpoint(), "Releasing dead session");
        if let Err(e) = stale.close().await {
            debug!(error = %e, "Error while releasing dead session");
        }
    }

    let outcome = establish(transport.as_ref(), &settings, &endpoint)
        .await
        .map_err(PorError::into_connection);

    if let Err(e) = &outcome {
        error!(endpoint = %endpoint, error = %e, "Failed to connect to chain node");
    }

    let doomed = {
        let mut inner = state.lock().unwrap_or_else(PoisonError::into_inner);
        let teardown = match inner.attempt.take() {
            Some(attempt) if attempt.generation == generation => attempt.teardown,
            other => {
                inner.attempt = other;
                false
            }
        };

        match &outcome {
            Ok(handle) if !teardown => {
                inner.handle = Some(Arc::clone(handle));
                None
            }
            Ok(handle) => {
                let err = PorError::connection("disconnected while connecting");
                inner.last_error = Some(err.clone());
                Some((Arc::clone(handle), err))
            }
            Err(e) => {
                inner.last_error = Some(e.clone());
                None
            }
        }
    };

    match doomed {
        Some((handle, err)) => {
            info!(endpoint = %handle.endpoint(), "Closing session opened during disconnect");
            if let Err(e) = handle.close().await {
                warn!(error = %e, "Error while closing session");
            }
            Err(err)
        }
        None => outcome,
    }
}

/// Opens the transport and waits for readiness, each bounded by its timeout.
async fn establish(
    transport: &dyn Transport,
    settings: &ConnectionSettings,
    endpoint: &str,
) -> Result<Arc<ConnectionHandle>> {
    let endpoint = Endpoint::parse(endpoint)?;
    info!(endpoint = %endpoint.display_string(), "Connecting to chain node");

    let raw = match timeout(settings.open_timeout, transport.open(&endpoint)).await {
        Ok(raw) => raw?,
        Err(_) => {
            return Err(PorError::connection(format!(
                "Timed out after {:?} opening {}",
                settings.open_timeout,
                endpoint.display_string()
            )))
        }
    };

    let ready = match timeout(settings.ready_timeout, raw.await_ready()).await {
        Ok(ready) => ready,
        Err(_) => Err(PorError::connection(format!(
            "Node at {} did not signal readiness within {:?}",
            endpoint.display_string(),
            settings.ready_timeout
        ))),
    };

    if let Err(e) = ready {
        if let Err(close_err) = raw.close().await {
            debug!(error = %close_err, "Error while releasing unready connection");
        }
        return Err(e);
    }

    let node = read_node_info(raw.as_ref()).await;
    info!(endpoint = %endpoint.display_string(), "Connected to chain node");

    Ok(Arc::new(ConnectionHandle::new(endpoint, raw, node)))
}

/// Reads chain diagnostics once. Failures are logged, not propagated.
async fn read_node_info(raw: &dyn RawConnection) -> Option<NodeInfo> {
    let chain = raw.chain().await;
    let version = raw.node_version().await;

    match (chain, version) {
        (Ok(chain), Ok(version)) => {
            info!(chain = %chain, version = %version, "Chain node diagnostics");
            Some(NodeInfo { chain, version })
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Could not read node diagnostics");
            None
        }
    }
}
