// src/session/websocket.rs

//! WebSocket transport over `tokio-tungstenite`.

use std::future::Future;
use std::pin::Pin;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::errors::{BridgeError, Result};

use super::connector::{ConnectRequest, Connection, Connector, Frame};

const OUTBOUND_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 256;

/// Production connector.
///
/// Spawns one writer task (outbound channel → socket) and one reader task
/// (socket → inbound channel) per connection. The reader drops its sender
/// when the socket ends, which the session observes as terminal closure.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn connect(
        &self,
        request: ConnectRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Connection>> + Send + '_>> {
        Box::pin(async move {
            let url = request.url.clone();
            let failure = |reason: String| BridgeError::ConnectFailure {
                url: url.clone(),
                reason,
            };

            let mut client_request = request
                .url
                .as_str()
                .into_client_request()
                .map_err(|e| failure(e.to_string()))?;

            if let Some(header) = &request.auth_header {
                let value = HeaderValue::from_str(header)
                    .map_err(|e| failure(format!("invalid authorization header: {e}")))?;
                client_request.headers_mut().insert(AUTHORIZATION, value);
            }

            let mut config = WebSocketConfig::default();
            config.max_message_size = Some(request.max_frame_bytes);
            config.max_frame_size = Some(request.max_frame_bytes);

            let (stream, response) = connect_async_with_config(client_request, Some(config), false)
                .await
                .map_err(|e| failure(e.to_string()))?;

            info!(url = %request.url, status = %response.status(), "websocket handshake complete");

            let (mut sink, mut source) = stream.split();
            let (out_tx, mut out_rx) = mpsc::channel::<Frame>(OUTBOUND_CAPACITY);
            let (in_tx, in_rx) = mpsc::channel::<Frame>(INBOUND_CAPACITY);

            tokio::spawn(async move {
                while let Some(frame) = out_rx.recv().await {
                    let closing = matches!(frame, Frame::Close(_));
                    if let Err(e) = sink.send(to_message(frame)).await {
                        warn!(error = %e, "websocket write failed; stopping writer");
                        break;
                    }
                    if closing {
                        break;
                    }
                }
                let _ = sink.close().await;
                debug!("websocket writer finished");
            });

            tokio::spawn(async move {
                while let Some(item) = source.next().await {
                    let frame = match item {
                        Ok(Message::Text(text)) => Frame::Text(text),
                        Ok(Message::Binary(bytes)) => Frame::Binary(bytes),
                        Ok(Message::Close(close)) => {
                            let reason = close.map(|c| c.reason.into_owned());
                            debug!(?reason, "websocket closed by peer");
                            let _ = in_tx.send(Frame::Close(reason)).await;
                            break;
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            warn!(error = %e, "websocket read failed; stopping reader");
                            break;
                        }
                    };
                    if in_tx.send(frame).await.is_err() {
                        break;
                    }
                }
                debug!("websocket reader finished");
            });

            Ok(Connection {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(bytes) => Message::Binary(bytes),
        Frame::Ping(payload) => Message::Ping(payload),
        Frame::Close(reason) => Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: reason.unwrap_or_default().into(),
        })),
    }
}
