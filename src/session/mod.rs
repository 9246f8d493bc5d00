// src/session/mod.rs

//! The single authenticated, bidirectional connection to the remote daemon.
//!
//! State machine: `Unopened → Connecting → Open → Closed`, with
//! `Connecting → Failed` on any authentication or handshake error. `Failed`
//! and `Closed` are terminal.
//!
//! Inbound frames are pushed into the [`MessageRouter`] from a dedicated
//! receive task. Sends go through the outbound channel and never contend
//! with the receive path.

pub mod connector;
pub mod websocket;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::Negotiator;
use crate::errors::{BridgeError, Result};
use crate::protocol::{encode_control, ControlMessage, MAX_FRAME_BYTES};
use crate::router::MessageRouter;

pub use connector::{ConnectRequest, Connection, Connector, Frame};
pub use websocket::WebSocketConnector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Connecting,
    Open,
    Closed,
    Failed,
}

/// Where the daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
        }
    }

    /// `ws://host:port/execution` or `wss://host:port/execution`.
    pub fn url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{}://{}:{}/execution", scheme, self.host, self.port)
    }
}

/// Something the liveness monitor can check.
pub trait Probe: Send + Sync {
    fn probe(&self) -> Result<()>;
}

pub struct RemoteSession {
    endpoint: Endpoint,
    negotiator: Option<Negotiator>,
    connector: Arc<dyn Connector>,
    router: Arc<MessageRouter>,
    state: Arc<Mutex<SessionState>>,
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,
    stop_sent: AtomicBool,
    receiver: Mutex<Option<JoinHandle<()>>>,
    max_frame_bytes: usize,
}

impl fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSession")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("stop_sent", &self.stop_sent.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl RemoteSession {
    pub fn new(
        endpoint: Endpoint,
        negotiator: Option<Negotiator>,
        connector: Arc<dyn Connector>,
        router: Arc<MessageRouter>,
    ) -> Self {
        Self {
            endpoint,
            negotiator,
            connector,
            router,
            state: Arc::new(Mutex::new(SessionState::Unopened)),
            outbound: Mutex::new(None),
            stop_sent: AtomicBool::new(false),
            receiver: Mutex::new(None),
            max_frame_bytes: MAX_FRAME_BYTES,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Whether the stop control message has already been transmitted.
    pub fn stop_sent(&self) -> bool {
        self.stop_sent.load(Ordering::Acquire)
    }

    /// Negotiate (if configured), perform the handshake and start receiving.
    ///
    /// Opening an already open session is a no-op.
    pub async fn open(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                SessionState::Open => return Ok(()),
                SessionState::Unopened => *state = SessionState::Connecting,
                other => {
                    return Err(BridgeError::InvalidState(format!(
                        "cannot open a session in state {other:?}"
                    )));
                }
            }
        }

        let url = self.endpoint.url();
        info!(%url, authenticated = self.negotiator.is_some(), "opening remote session");

        match self.connect(&url).await {
            Ok(connection) => {
                *self.outbound.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(connection.outbound);
                self.set_state(SessionState::Open);
                let handle = self.spawn_receiver(connection.inbound);
                *self.receiver.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                info!(%url, "remote session open");
                Ok(())
            }
            Err(err) => {
                self.set_state(SessionState::Failed);
                warn!(%url, error = %err, "failed to open remote session");
                Err(match err {
                    e @ BridgeError::ConnectFailure { .. } => e,
                    other => BridgeError::ConnectFailure {
                        url,
                        reason: other.to_string(),
                    },
                })
            }
        }
    }

    async fn connect(&self, url: &str) -> Result<Connection> {
        let mut negotiated = match &self.negotiator {
            Some(negotiator) => {
                let negotiator = negotiator.clone();
                let host = self.endpoint.host.clone();
                let port = self.endpoint.port;
                let result =
                    tokio::task::spawn_blocking(move || negotiator.negotiate(&host, port))
                        .await
                        .map_err(anyhow::Error::from)?;
                Some(result?)
            }
            None => None,
        };

        let request = ConnectRequest {
            url: url.to_string(),
            auth_header: negotiated.as_ref().map(|n| n.header().to_string()),
            max_frame_bytes: self.max_frame_bytes,
        };

        let result = self.connector.connect(request).await;

        // The credential is only needed for the handshake itself.
        if let Some(negotiated) = negotiated.as_mut() {
            negotiated.release();
        }

        result
    }

    fn spawn_receiver(&self, mut inbound: mpsc::Receiver<Frame>) -> JoinHandle<()> {
        let router = Arc::clone(&self.router);
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                let payload = match frame {
                    Frame::Text(text) => text.into_bytes(),
                    Frame::Binary(bytes) => bytes,
                    Frame::Ping(_) => continue,
                    Frame::Close(reason) => {
                        info!(?reason, "remote daemon closed the session");
                        break;
                    }
                };

                if let Err(err) = router.dispatch_frame(&payload) {
                    warn!(error = %err, "inbound message dispatch failed");
                }
            }

            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == SessionState::Open {
                *state = SessionState::Closed;
                info!("transport reported closure; session closed");
            }
        })
    }

    /// Send a control message.
    ///
    /// The stop message is transmitted at most once per session; later stop
    /// sends succeed without transmitting.
    pub async fn send(&self, message: &ControlMessage) -> Result<()> {
        let outbound = self.open_sender()?;

        if message.is_stop() && self.stop_sent.swap(true, Ordering::AcqRel) {
            debug!("stop message already sent; skipping");
            return Ok(());
        }

        let text = encode_control(message)?;
        debug!(bytes = text.len(), stop = message.is_stop(), "sending control message");
        outbound.send(Frame::Text(text)).await.map_err(|_| {
            self.mark_closed();
            BridgeError::SessionNotOpen
        })
    }

    /// Request a normal closure carrying `reason`.
    pub async fn close(&self, reason: &str) -> Result<()> {
        let outbound = self.open_sender()?;
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.set_state(SessionState::Closed);

        if outbound
            .send(Frame::Close(Some(reason.to_string())))
            .await
            .is_err()
        {
            debug!("transport already gone while closing");
        }
        info!(reason, "remote session closed");
        Ok(())
    }

    fn open_sender(&self) -> Result<mpsc::Sender<Frame>> {
        if !self.is_open() {
            return Err(BridgeError::SessionNotOpen);
        }
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(BridgeError::SessionNotOpen)
    }

    fn set_state(&self, new_state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = new_state;
    }

    fn mark_closed(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == SessionState::Open {
            *state = SessionState::Closed;
        }
    }
}

impl Probe for RemoteSession {
    /// Lightweight liveness check used only by the liveness monitor.
    ///
    /// A full outbound queue means the writer is stuck on the peer, so it
    /// counts as a failed probe while the session stays open.
    fn probe(&self) -> Result<()> {
        let outbound = self.open_sender()?;
        match outbound.try_send(Frame::Ping(Vec::new())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!(url = %self.endpoint.url(), "outbound queue full; peer is not draining");
                Err(BridgeError::CommunicationLost)
            }
            Err(TrySendError::Closed(_)) => {
                self.mark_closed();
                Err(BridgeError::SessionNotOpen)
            }
        }
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        if let Some(handle) = self
            .receiver
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
