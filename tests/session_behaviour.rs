// tests/session_behaviour.rs

mod common;
use crate::common::{init_tracing, with_timeout, FakeConnector, OUTBOUND_CAPACITY};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use remote_bridge::auth::{CredentialSource, GssBackend, GssCredential, Negotiator};
use remote_bridge::errors::BridgeError;
use remote_bridge::protocol::{catalog, ControlMessage, RemoteEvent, RemoteStatus, Scope, StopMessage};
use remote_bridge::router::MessageRouter;
use remote_bridge::session::{Connector, Endpoint, Frame, Probe, RemoteSession, SessionState};

type TestResult = Result<(), Box<dyn Error>>;

fn session_with(connector: &Arc<FakeConnector>, negotiator: Option<Negotiator>) -> RemoteSession {
    let connector: Arc<dyn Connector> = connector.clone();
    RemoteSession::new(
        Endpoint::new("daemon.test", 53000, false),
        negotiator,
        connector,
        Arc::new(MessageRouter::new()),
    )
}

struct FixedTokenBackend;
struct FixedTokenCredential;

impl GssBackend for FixedTokenBackend {
    fn login(&self, _source: &CredentialSource) -> anyhow::Result<Box<dyn GssCredential>> {
        Ok(Box::new(FixedTokenCredential))
    }
}

impl GssCredential for FixedTokenCredential {
    fn initiate(&mut self, _target: &str) -> anyhow::Result<Vec<u8>> {
        Ok(b"token".to_vec())
    }

    fn logout(&mut self) {}
}

#[tokio::test]
async fn send_before_open_is_session_not_open() {
    init_tracing();
    let connector = FakeConnector::new();
    let session = session_with(&connector, None);

    let err = session
        .send(&ControlMessage::Stop(StopMessage::new("early")))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::SessionNotOpen));
    assert!(matches!(session.probe(), Err(BridgeError::SessionNotOpen)));
    assert!(matches!(session.close("bye").await, Err(BridgeError::SessionNotOpen)));
    assert_eq!(session.state(), SessionState::Unopened);
}

#[tokio::test]
async fn unauthenticated_open_targets_execution_endpoint() -> TestResult {
    init_tracing();
    let connector = FakeConnector::new();
    let session = session_with(&connector, None);

    session.open().await?;
    session.open().await?;

    assert_eq!(session.state(), SessionState::Open);
    let requests = connector.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "ws://daemon.test:53000/execution");
    assert_eq!(requests[0].auth_header, None);
    assert_eq!(requests[0].max_frame_bytes, 500_000);
    Ok(())
}

#[tokio::test]
async fn negotiated_header_is_attached_to_handshake() -> TestResult {
    init_tracing();
    let connector = FakeConnector::new();
    let negotiator = Negotiator::new(
        CredentialSource::TicketCache {
            principal: "etl@EXAMPLE.COM".to_string(),
        },
        "HTTP",
        Arc::new(FixedTokenBackend),
    );
    let session = session_with(&connector, Some(negotiator));

    session.open().await?;

    assert_eq!(
        connector.requests()[0].auth_header.as_deref(),
        Some("Negotiate dG9rZW4=")
    );
    Ok(())
}

#[tokio::test]
async fn refused_handshake_fails_the_session() {
    init_tracing();
    let connector = FakeConnector::refusing("401 Unauthorized");
    let session = session_with(&connector, None);

    let err = session.open().await.unwrap_err();
    assert!(matches!(err, BridgeError::ConnectFailure { .. }), "{err}");
    assert_eq!(session.state(), SessionState::Failed);
    assert!(matches!(
        session.open().await,
        Err(BridgeError::InvalidState(_))
    ));
}

#[tokio::test]
async fn concurrent_stop_sends_transmit_once() -> TestResult {
    init_tracing();
    let connector = FakeConnector::new();
    let session = Arc::new(session_with(&connector, None));
    session.open().await?;

    let senders: Vec<_> = (0..8)
        .map(|i| {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .send(&ControlMessage::Stop(StopMessage::new(format!("stop {i}"))))
                    .await
            })
        })
        .collect();
    for sender in senders {
        sender.await??;
    }

    with_timeout(connector.wait_for_sent("stop", 1)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(connector.sent_of_type("stop").len(), 1);
    assert!(session.stop_sent());
    Ok(())
}

#[tokio::test]
async fn inbound_frames_are_dispatched_to_the_router() -> TestResult {
    init_tracing();
    let connector = FakeConnector::new();
    let router = Arc::new(MessageRouter::new());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    router.register(catalog::operation_status("read"), "test", move |event| {
        tx.send(event.clone())?;
        Ok(())
    })?;

    let dyn_connector: Arc<dyn Connector> = connector.clone();
    let session = RemoteSession::new(
        Endpoint::new("daemon.test", 53000, false),
        None,
        dyn_connector,
        Arc::clone(&router),
    );
    session.open().await?;

    // An undecodable frame is logged and skipped, not fatal.
    connector.push_frame(Frame::Text("garbage".to_string())).await?;
    let event = RemoteEvent::Status {
        scope: Scope::operation("read"),
        status: RemoteStatus::Running,
    };
    connector
        .push_frame(Frame::Binary(serde_json::to_vec(&event)?))
        .await?;

    let received = with_timeout(rx.recv()).await;
    assert_eq!(received, Some(event));
    assert_eq!(session.state(), SessionState::Open);
    Ok(())
}

#[tokio::test]
async fn transport_closure_closes_the_session() -> TestResult {
    init_tracing();
    let connector = FakeConnector::new();
    let session = session_with(&connector, None);
    session.open().await?;
    session.probe()?;

    connector.disconnect();
    with_timeout(async {
        while session.state() != SessionState::Closed {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;

    assert!(matches!(session.probe(), Err(BridgeError::SessionNotOpen)));
    Ok(())
}

#[tokio::test]
async fn close_sends_reason_and_is_terminal() -> TestResult {
    init_tracing();
    let connector = FakeConnector::new();
    let session = session_with(&connector, None);
    session.open().await?;

    session.close("job finished").await?;
    assert_eq!(session.state(), SessionState::Closed);

    with_timeout(async {
        while !connector
            .sent_frames()
            .contains(&Frame::Close(Some("job finished".to_string())))
        {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;

    let err = session
        .send(&ControlMessage::Stop(StopMessage::new("late")))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::SessionNotOpen));
    Ok(())
}

#[tokio::test]
async fn full_outbound_queue_fails_the_liveness_check() -> TestResult {
    init_tracing();
    let connector = FakeConnector::stalled();
    let session = session_with(&connector, None);
    session.open().await?;

    for _ in 0..OUTBOUND_CAPACITY {
        session.probe()?;
    }

    let err = session.probe().unwrap_err();
    assert!(matches!(err, BridgeError::CommunicationLost), "{err}");
    assert!(matches!(session.probe(), Err(BridgeError::CommunicationLost)));
    assert_eq!(session.state(), SessionState::Open);
    Ok(())
}
