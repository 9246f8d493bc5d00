// src/errors.rs

//! Crate-wide error type and result alias.

use std::fmt;

use thiserror::Error;

use crate::protocol::EventAddress;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cycle detected in job graph: {0}")]
    GraphCycle(String),

    #[error("Message encoding error: {0}")]
    CodecError(#[from] serde_json::Error),

    #[error("Frame of {size} bytes exceeds the {limit} byte ceiling")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("Authentication negotiation failed: {0}")]
    NegotiationFailure(String),

    #[error("Failed to connect to {url}: {reason}")]
    ConnectFailure { url: String, reason: String },

    #[error("Session is not open")]
    SessionNotOpen,

    #[error("Handler '{identifier}' is already registered for {address}")]
    DuplicateHandler {
        address: EventAddress,
        identifier: String,
    },

    #[error("Invalid dispatch: {0}")]
    InvalidDispatch(String),

    #[error(transparent)]
    DispatchAggregateFailure(#[from] DispatchFailures),

    #[error("Remote daemon reported an error: {0}")]
    RemoteReportedError(String),

    #[error("Communication with the server was lost")]
    CommunicationLost,

    #[error("Failed to prepare job: {0}")]
    PrepareError(#[source] Box<BridgeError>),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BridgeError {
    pub fn prepare(err: BridgeError) -> Self {
        BridgeError::PrepareError(Box::new(err))
    }
}

/// A single handler failure collected during one dispatch.
#[derive(Debug)]
pub struct HandlerFailure {
    pub identifier: String,
    pub error: anyhow::Error,
}

/// Every handler failure from one `MessageRouter::dispatch` call.
///
/// Dispatch keeps invoking the remaining handlers after a failure, so this
/// may hold more than one entry.
#[derive(Debug, Error)]
pub struct DispatchFailures {
    pub address: EventAddress,
    pub failures: Vec<HandlerFailure>,
}

impl DispatchFailures {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.identifier.as_str())
    }
}

impl fmt::Display for DispatchFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} handler(s) failed while dispatching {}",
            self.failures.len(),
            self.address
        )?;
        for failure in &self.failures {
            write!(f, "; {}: {:#}", failure.identifier, failure.error)?;
        }
        Ok(())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, BridgeError>;
