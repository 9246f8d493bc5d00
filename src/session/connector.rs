// src/session/connector.rs

//! Pluggable transport abstraction.
//!
//! The session talks to a [`Connector`] instead of a concrete socket. The
//! production implementation is [`super::websocket::WebSocketConnector`];
//! tests provide an in-memory connector that hands them both ends of the
//! frame channels.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::errors::Result;

/// One transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    /// Normal closure with an optional human-readable reason.
    Close(Option<String>),
}

/// Parameters for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
    /// Negotiated `Authorization` header value, handshake only.
    pub auth_header: Option<String>,
    /// Ceiling applied to both text and binary frames.
    pub max_frame_bytes: usize,
}

/// An established bidirectional connection.
///
/// Dropping `outbound` asks the transport to shut down. The transport
/// closes `inbound` when the connection terminates for any reason.
#[derive(Debug)]
pub struct Connection {
    pub outbound: mpsc::Sender<Frame>,
    pub inbound: mpsc::Receiver<Frame>,
}

/// Trait abstracting how a session reaches the remote daemon.
pub trait Connector: Send + Sync {
    /// Perform the transport handshake.
    fn connect(
        &self,
        request: ConnectRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Connection>> + Send + '_>>;
}
