// src/protocol/messages.rs

//! Messages exchanged with the remote daemon.
//!
//! Inbound traffic is a stream of [`RemoteEvent`]s. Outbound traffic is one
//! [`ControlMessage::Execute`] followed by at most one
//! [`ControlMessage::Stop`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::job::JobDescription;
use crate::protocol::address::{EventAddress, EventKind, OperationId, Scope};
use crate::types::RemoteLogLevel;

/// Execution status as reported by the remote daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Running,
    Paused,
    Stopped,
    Failed,
    Finished,
}

/// Direction of a row batch relative to the operation that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowDirection {
    In,
    Out,
}

/// One data row; field order follows the operation's row layout.
pub type Row = Vec<serde_json::Value>;

/// Server → client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteEvent {
    Log {
        scope: Scope,
        /// Operation that produced the line, when known.
        #[serde(default)]
        origin: Option<OperationId>,
        level: RemoteLogLevel,
        message: String,
    },
    Status {
        scope: Scope,
        status: RemoteStatus,
    },
    Error {
        scope: Scope,
        message: String,
        #[serde(default)]
        cause: Option<String>,
    },
    Metrics {
        operation: OperationId,
        #[serde(default)]
        rows_in: u64,
        #[serde(default)]
        rows_out: u64,
    },
    Rows {
        operation: OperationId,
        direction: RowDirection,
        #[serde(default)]
        rows: Vec<Row>,
    },
    /// Acknowledgement that the remote execution has stopped.
    Stop {
        #[serde(default)]
        reason: String,
        #[serde(default)]
        errors: Vec<String>,
    },
}

impl RemoteEvent {
    /// Routing address for this event.
    pub fn address(&self) -> EventAddress {
        match self {
            RemoteEvent::Log { scope, .. } => EventAddress::new(EventKind::Log, scope.clone()),
            RemoteEvent::Status { scope, .. } => {
                EventAddress::new(EventKind::Status, scope.clone())
            }
            RemoteEvent::Error { scope, .. } => EventAddress::new(EventKind::Error, scope.clone()),
            RemoteEvent::Metrics { operation, .. } => {
                EventAddress::new(EventKind::Metrics, Scope::Operation(operation.clone()))
            }
            RemoteEvent::Rows { operation, .. } => {
                EventAddress::new(EventKind::Rows, Scope::Operation(operation.clone()))
            }
            RemoteEvent::Stop { .. } => EventAddress::stop(),
        }
    }
}

/// Immutable snapshot sent once to start the remote run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub job: JobDescription,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    pub log_level: RemoteLogLevel,
    /// Acting principal the daemon runs the job as.
    pub principal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopMessage {
    pub reason: String,
    /// Graceful stop: let operations drain their queued input.
    #[serde(default)]
    pub safe: bool,
}

impl StopMessage {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            safe: false,
        }
    }

    pub fn safe(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            safe: true,
        }
    }
}

/// Client → server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Execute(ExecutionRequest),
    Stop(StopMessage),
}

impl ControlMessage {
    pub fn is_stop(&self) -> bool {
        matches!(self, ControlMessage::Stop(_))
    }
}
