//! Connection manager integration tests.
//!
//! Drives the manager through the mock transport with paused tokio time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use por_link::config::{ConnectionSettings, Endpoint};
use por_link::connection::{ConnectionManager, SessionState};
use por_link::error::{PorError, Result};
use por_link::transport::{FailingTransport, MockTransport, RawConnection, Transport};
use pretty_assertions::assert_eq;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

const ENDPOINT: &str = "wss://node.example:9443";

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn manager_with(transport: &MockTransport) -> ConnectionManager {
    ConnectionManager::new(Arc::new(transport.clone()), ConnectionSettings::new(ENDPOINT))
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_share_one_attempt() {
    let transport = MockTransport::new()
        .with_open_delay(ms(20))
        .with_ready_delay(ms(20));
    let manager = manager_with(&transport);

    let (a, b) = tokio::join!(manager.connect(None), manager.connect(None));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_share_one_failure() {
    let transport = MockTransport::new()
        .with_open_delay(ms(20))
        .failing_open("unreachable");
    let manager = manager_with(&transport);

    let (a, b) = tokio::join!(manager.connect(None), manager.connect(None));
    let (a, b) = (a.unwrap_err(), b.unwrap_err());

    assert_eq!(a, b);
    assert_eq!(a, PorError::connection("unreachable"));
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_connected_after_connect() {
    let transport = MockTransport::new();
    let manager = manager_with(&transport);

    let handle = manager.connect(None).await.unwrap();

    assert!(manager.is_connected());
    let current = manager.current_handle().unwrap();
    assert!(Arc::ptr_eq(&handle, &current));
    assert_eq!(manager.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let transport = MockTransport::new();
    let manager = manager_with(&transport);

    manager.connect(None).await.unwrap();
    for _ in 0..3 {
        assert_ok!(manager.disconnect().await);
        assert!(!manager.is_connected());
        assert!(manager.current_handle().is_none());
    }

    assert_eq!(manager.state(), SessionState::Disconnected);
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn test_disconnect_without_connect_is_noop() {
    let manager = manager_with(&MockTransport::new());
    assert_ok!(manager.disconnect().await);
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_connect_after_disconnect_starts_fresh() {
    let transport = MockTransport::new();
    let manager = manager_with(&transport);

    let first = manager.connect(None).await.unwrap();
    manager.disconnect().await.unwrap();
    assert!(!first.is_live());

    let second = manager.connect(None).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.is_live());
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test]
async fn test_failure_is_not_sticky() {
    let transport = MockTransport::new().failing_first_opens(1, "unreachable");
    let manager = manager_with(&transport);

    let err = manager.connect(None).await.unwrap_err();
    assert!(matches!(err, PorError::Connection(_)));
    assert_eq!(manager.state(), SessionState::Disconnected);

    manager.connect(None).await.unwrap();
    assert_eq!(transport.open_count(), 2);
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_every_failed_connect_is_a_new_attempt() {
    let transport = MockTransport::new().failing_open("unreachable");
    let manager = manager_with(&transport);

    assert_err!(manager.connect(None).await);
    assert_err!(manager.connect(None).await);
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_staggered_callers_receive_same_handle() {
    // Open completes at t=50ms, readiness at t=100ms
    let transport = MockTransport::new()
        .with_open_delay(ms(50))
        .with_ready_delay(ms(50));
    let manager = manager_with(&transport);
    let start = Instant::now();

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let handle = manager.connect(Some(ENDPOINT)).await;
            (handle, Instant::now())
        })
    };

    tokio::time::sleep(ms(10)).await;

    let second = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let handle = manager.connect(Some(ENDPOINT)).await;
            (handle, Instant::now())
        })
    };

    let (first, first_at) = first.await.unwrap();
    let (second, second_at) = second.await.unwrap();
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(transport.open_count(), 1);
    assert_eq!(first.endpoint().as_str(), ENDPOINT);

    for at in [first_at, second_at] {
        let elapsed = at - start;
        assert!(elapsed >= ms(100), "resolved too early: {elapsed:?}");
        assert!(elapsed < ms(110), "resolved too late: {elapsed:?}");
    }
}

#[tokio::test]
async fn test_unreachable_node() {
    let manager = ConnectionManager::new(
        Arc::new(FailingTransport::new("unreachable")),
        ConnectionSettings::new(ENDPOINT),
    );

    let err = manager.connect(None).await.unwrap_err();

    assert!(matches!(err, PorError::Connection(_)));
    assert!(err.to_string().contains("unreachable"));
    assert!(!manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_readiness_timeout() {
    let transport = MockTransport::new().never_ready();
    let manager = ConnectionManager::new(
        Arc::new(transport.clone()),
        ConnectionSettings::new(ENDPOINT).with_ready_timeout(Duration::from_secs(1)),
    );

    let err = manager.connect(None).await.unwrap_err();

    assert!(matches!(err, PorError::Connection(_)));
    assert!(err.to_string().contains("did not signal readiness"));
    assert_eq!(transport.close_count(), 1);
    assert!(!manager.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_open_timeout() {
    let transport = MockTransport::new().with_open_delay(Duration::from_secs(5));
    let manager = ConnectionManager::new(
        Arc::new(transport.clone()),
        ConnectionSettings::new(ENDPOINT).with_open_timeout(Duration::from_secs(1)),
    );

    let err = manager.connect(None).await.unwrap_err();

    assert!(matches!(err, PorError::Connection(_)));
    assert!(err.to_string().contains("Timed out"));
}

#[tokio::test]
async fn test_readiness_failure_releases_transport() {
    let transport = MockTransport::new().failing_ready("metadata unavailable");
    let manager = manager_with(&transport);

    let err = manager.connect(None).await.unwrap_err();

    assert_eq!(err, PorError::connection("metadata unavailable"));
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn test_dead_handle_is_replaced() {
    let transport = MockTransport::new();
    let manager = manager_with(&transport);

    let first = manager.connect(None).await.unwrap();
    transport.drop_connections();

    assert!(!manager.is_connected());
    assert!(manager.current_handle().is_none());
    assert_eq!(manager.state(), SessionState::Disconnected);

    let second = manager.connect(None).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(manager.is_connected());
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_while_connecting() {
    let transport = MockTransport::new().with_open_delay(ms(50));
    let manager = manager_with(&transport);

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.connect(None).await })
    };
    tokio::time::sleep(ms(10)).await;
    assert_eq!(manager.state(), SessionState::Connecting);

    manager.disconnect().await.unwrap();

    // The attempt has settled by the time disconnect returns
    assert_eq!(manager.state(), SessionState::Disconnected);
    assert!(!manager.is_connected());
    assert_eq!(transport.close_count(), 1);

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, PorError::connection("disconnected while connecting"));

    manager.connect(None).await.unwrap();
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_attempt_runs_to_completion() {
    let transport = MockTransport::new().with_open_delay(ms(50));
    let manager = manager_with(&transport);

    let caller = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.connect(None).await })
    };
    tokio::time::sleep(ms(10)).await;
    caller.abort();

    tokio::time::sleep(ms(100)).await;

    assert!(manager.is_connected());
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test]
async fn test_independent_managers_do_not_share_state() {
    let transport = MockTransport::new();
    let a = manager_with(&transport);
    let b = manager_with(&transport);

    a.connect(None).await.unwrap();

    assert!(a.is_connected());
    assert!(!b.is_connected());

    b.connect(None).await.unwrap();
    assert_eq!(transport.open_count(), 2);
}

#[tokio::test]
async fn test_status_snapshot() {
    let transport = MockTransport::new().with_node_info("Proof of Reserve", "1.0.0");
    let manager = manager_with(&transport);

    manager.connect(None).await.unwrap();
    let status = manager.status();

    assert_eq!(status.state, SessionState::Connected);
    assert_eq!(status.endpoint.as_deref(), Some(ENDPOINT));
    let node = status.node.unwrap();
    assert_eq!(node.chain, "Proof of Reserve");
    assert_eq!(node.version, "1.0.0");
    assert_eq!(status.last_error, None);
}

/// A transport whose `open` panics, counting how often it was called.
#[derive(Default)]
struct PanickingTransport {
    opens: AtomicUsize,
}

#[async_trait]
impl Transport for PanickingTransport {
    async fn open(&self, _endpoint: &Endpoint) -> Result<Box<dyn RawConnection>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        panic!("transport exploded");
    }
}

#[tokio::test]
async fn test_panicking_attempt_is_connection_error() {
    let transport = Arc::new(PanickingTransport::default());
    let manager = ConnectionManager::new(transport.clone(), ConnectionSettings::new(ENDPOINT));

    let err = manager.connect(None).await.unwrap_err();
    assert!(matches!(err, PorError::Connection(_)), "got {err:?}");
    assert_eq!(manager.state(), SessionState::Disconnected);
    assert!(!manager.is_connected());

    // The failed attempt is cleared and the next call starts over
    let err = manager.connect(None).await.unwrap_err();
    assert!(matches!(err, PorError::Connection(_)));
    assert_eq!(transport.opens.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_handle_uptime_tracks_session_age() {
    let manager = manager_with(&MockTransport::new());

    let handle = manager.connect(None).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert!(handle.uptime() >= Duration::from_secs(5));
}
