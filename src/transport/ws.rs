//! WebSocket JSON-RPC transport for Substrate nodes.
//!
//! One socket per connection. A writer task drains an outgoing channel into the
//! socket and a reader task correlates responses to pending requests by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::{tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::rpc::{self, RuntimeVersion};
use super::{RawConnection, Transport};
use crate::config::Endpoint;
use crate::error::{PorError, Result};

/// Default timeout for a single RPC request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static CRYPTO_PROVIDER: Once = Once::new();

/// Installs the process-wide rustls provider needed for `wss` endpoints.
fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // Fails only if the host application installed one first
        if rustls::crypto::ring::default_provider().install_default().is_err() {
            debug!("rustls crypto provider already installed");
        }
    });
}

type NodeSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// Opens WebSocket JSON-RPC connections.
#[derive(Debug, Clone)]
pub struct WsTransport {
    request_timeout: Duration,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WsTransport {
    /// Creates a transport with the default request timeout.
    pub fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets a custom timeout for individual RPC requests.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Opens a JSON-RPC session without the readiness check.
    pub async fn connect(&self, endpoint: &Endpoint) -> Result<WsConnection> {
        debug!(endpoint = %endpoint.display_string(), "Opening WebSocket");

        if endpoint.is_secure() {
            install_crypto_provider();
        }

        let (socket, _response) = tokio_tungstenite::connect_async(endpoint.as_str())
            .await
            .map_err(|e| {
                PorError::transport(format!(
                    "Cannot reach {}: {e}",
                    endpoint.display_string()
                ))
            })?;

        Ok(WsConnection::start(socket, self.request_timeout))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn RawConnection>> {
        Ok(Box::new(self.connect(endpoint).await?))
    }
}

/// A live JSON-RPC session over one WebSocket.
pub struct WsConnection {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    next_id: AtomicU64,
    live: Arc<AtomicBool>,
    shutdown: CancellationToken,
    request_timeout: Duration,
}

impl WsConnection {
    fn start(socket: NodeSocket, request_timeout: Duration) -> Self {
        let (mut sink, mut stream) = socket.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let live = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();

        let writer_shutdown = shutdown.clone();
        let writer_live = Arc::clone(&live);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_shutdown.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    msg = outgoing_rx.recv() => match msg {
                        Some(msg) => {
                            if let Err(e) = sink.send(msg).await {
                                warn!(error = %e, "WebSocket send failed");
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            writer_live.store(false, Ordering::SeqCst);
        });

        let reader_shutdown = shutdown.clone();
        let reader_live = Arc::clone(&live);
        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_shutdown.cancelled() => break,
                    next = stream.next() => match next {
                        Some(Ok(Message::Text(text))) => dispatch(&reader_pending, &text),
                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => dispatch(&reader_pending, text),
                            Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Node closed the connection");
                            break;
                        }
                        // Pings are answered by tungstenite
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                    },
                }
            }
            reader_live.store(false, Ordering::SeqCst);
            fail_pending(&reader_pending, "connection closed");
        });

        Self {
            outgoing,
            pending,
            next_id: AtomicU64::new(1),
            live,
            shutdown,
            request_timeout,
        }
    }

    /// Sends a request and waits for its response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if !self.is_live() {
            return Err(PorError::transport(format!(
                "Cannot call {method}: connection is closed"
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = rpc::encode_request(id, method, params)?;
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        // The reader may have drained the map between the liveness check and the insert
        if !self.is_live() || self.outgoing.send(Message::Text(frame)).is_err() {
            lock(&self.pending).remove(&id);
            return Err(PorError::transport(format!(
                "Cannot call {method}: connection is closed"
            )));
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PorError::transport(format!(
                "Connection closed before {method} returned"
            ))),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(PorError::transport(format!(
                    "{method} timed out after {:?}",
                    self.request_timeout
                )))
            }
        }
    }

    /// Fetches the runtime version of the node.
    pub async fn runtime_version(&self) -> Result<RuntimeVersion> {
        let value = self.request("state_getRuntimeVersion", json!([])).await?;
        serde_json::from_value(value)
            .map_err(|e| PorError::transport(format!("Unexpected runtime version: {e}")))
    }

    async fn request_string(&self, method: &str) -> Result<String> {
        match self.request(method, json!([])).await? {
            Value::String(s) => Ok(s),
            other => Err(PorError::transport(format!(
                "Unexpected {method} result: {other}"
            ))),
        }
    }
}

#[async_trait]
impl RawConnection for WsConnection {
    async fn await_ready(&self) -> Result<()> {
        let version = self.runtime_version().await?;
        let metadata = self.request_string("state_getMetadata").await?;

        if !rpc::is_metadata(&metadata) {
            return Err(PorError::transport("Node returned no runtime metadata"));
        }

        debug!(
            spec_name = %version.spec_name,
            spec_version = version.spec_version,
            metadata_bytes = (metadata.len() - 2) / 2,
            "Runtime metadata loaded"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        self.live.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        fail_pending(&self.pending, "connection closed by client");
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn chain(&self) -> Result<String> {
        self.request_string("system_chain").await
    }

    async fn node_version(&self) -> Result<String> {
        self.request_string("system_version").await
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Result<Value>>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn dispatch(pending: &PendingMap, text: &str) {
    let response = match rpc::decode_response(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Dropping undecodable frame");
            return;
        }
    };

    let Some(id) = response.id else {
        debug!("Ignoring notification");
        return;
    };

    match lock(pending).remove(&id) {
        Some(tx) => {
            let _ = tx.send(response.into_result());
        }
        None => debug!(id, "Response for unknown request"),
    }
}

fn fail_pending(pending: &PendingMap, reason: &str) {
    for (_, tx) in lock(pending).drain() {
        let _ = tx.send(Err(PorError::transport(reason)));
    }
}
