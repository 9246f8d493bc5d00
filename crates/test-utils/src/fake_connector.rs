use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use remote_bridge::errors::{BridgeError, Result};
use remote_bridge::protocol::RemoteEvent;
use remote_bridge::session::{ConnectRequest, Connection, Connector, Frame};

/// Queue depth of both fake connection directions.
pub const OUTBOUND_CAPACITY: usize = 64;

/// An in-memory connector standing in for the remote daemon.
///
/// - records every `ConnectRequest`
/// - collects every outbound frame the session sends
/// - lets the test push inbound events
/// - can refuse to connect, or drop the connection to simulate loss
/// - can stop reading outbound frames, as a peer that never acks would
#[derive(Default)]
pub struct FakeConnector {
    refuse: Mutex<Option<String>>,
    stalled: bool,
    requests: Mutex<Vec<ConnectRequest>>,
    sent: Arc<Mutex<Vec<Frame>>>,
    inbound: Mutex<Option<mpsc::Sender<Frame>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A connector whose handshake always fails with `reason`.
    pub fn refusing(reason: &str) -> Arc<Self> {
        let connector = Self::default();
        *connector.refuse.lock().unwrap() = Some(reason.to_string());
        Arc::new(connector)
    }

    /// A connector whose daemon accepts the handshake but never reads.
    pub fn stalled() -> Arc<Self> {
        Arc::new(Self {
            stalled: true,
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent.lock().unwrap().clone()
    }

    /// Outbound text frames decoded as JSON.
    pub fn sent_messages(&self) -> Vec<serde_json::Value> {
        self.sent_frames()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => serde_json::from_str(&text).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn sent_of_type(&self, kind: &str) -> Vec<serde_json::Value> {
        self.sent_messages()
            .into_iter()
            .filter(|m| m["type"] == kind)
            .collect()
    }

    /// Wait until at least `count` messages of type `kind` were sent.
    pub async fn wait_for_sent(&self, kind: &str, count: usize) {
        while self.sent_of_type(kind).len() < count {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Deliver one event to the session as the daemon would.
    pub async fn push(&self, event: &RemoteEvent) -> anyhow::Result<()> {
        let text = serde_json::to_string(event)?;
        self.push_frame(Frame::Text(text)).await
    }

    pub async fn push_frame(&self, frame: Frame) -> anyhow::Result<()> {
        let tx = self
            .inbound
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("fake daemon is not connected"))?;
        tx.send(frame).await?;
        Ok(())
    }

    /// Drop both directions of the connection, as a dead network would.
    pub fn disconnect(&self) {
        self.inbound.lock().unwrap().take();
        if let Some(forwarder) = self.forwarder.lock().unwrap().take() {
            forwarder.abort();
        }
        debug!("fake daemon disconnected");
    }
}

impl Connector for FakeConnector {
    fn connect(
        &self,
        request: ConnectRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Connection>> + Send + '_>> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request.clone());

            if let Some(reason) = self.refuse.lock().unwrap().clone() {
                return Err(BridgeError::ConnectFailure {
                    url: request.url,
                    reason,
                });
            }

            let (out_tx, mut out_rx) = mpsc::channel::<Frame>(OUTBOUND_CAPACITY);
            let (in_tx, in_rx) = mpsc::channel::<Frame>(OUTBOUND_CAPACITY);

            let sent = Arc::clone(&self.sent);
            let stalled = self.stalled;
            let forwarder = tokio::spawn(async move {
                if stalled {
                    let _held = out_rx;
                    std::future::pending::<()>().await;
                    return;
                }
                while let Some(frame) = out_rx.recv().await {
                    sent.lock().unwrap().push(frame);
                }
            });

            *self.inbound.lock().unwrap() = Some(in_tx);
            *self.forwarder.lock().unwrap() = Some(forwarder);

            Ok(Connection {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}
