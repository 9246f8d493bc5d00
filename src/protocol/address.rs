// src/protocol/address.rs

//! Event addresses: "what happened to what".
//!
//! An address is an event kind plus a scope. Dispatch compares addresses with
//! [`EventAddress::matches`], never with structural equality of the messages
//! themselves:
//!
//! - a stop address carries no scope and matches every stop message;
//! - a job-wide address matches only job-wide messages of the same kind;
//! - an operation address matches only messages of the same kind for the
//!   identical operation id.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one operation (node) of the job graph.
pub type OperationId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Log,
    Status,
    Error,
    Metrics,
    Rows,
    Stop,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Log => "log",
            EventKind::Status => "status",
            EventKind::Error => "error",
            EventKind::Metrics => "metrics",
            EventKind::Rows => "rows",
            EventKind::Stop => "stop",
        }
    }
}

/// Scope of an event: the whole job, or one operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    JobWide,
    Operation(OperationId),
}

impl Scope {
    pub fn operation(id: impl Into<OperationId>) -> Self {
        Scope::Operation(id.into())
    }

    pub fn operation_id(&self) -> Option<&str> {
        match self {
            Scope::JobWide => None,
            Scope::Operation(id) => Some(id.as_str()),
        }
    }
}

/// Routing key for inbound messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventAddress {
    kind: EventKind,
    scope: Option<Scope>,
}

impl EventAddress {
    /// Build an address. Stop addresses never keep a scope.
    pub fn new(kind: EventKind, scope: Scope) -> Self {
        match kind {
            EventKind::Stop => Self::stop(),
            _ => Self {
                kind,
                scope: Some(scope),
            },
        }
    }

    pub fn stop() -> Self {
        Self {
            kind: EventKind::Stop,
            scope: None,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// `None` for stop addresses.
    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    /// Whether two addresses route to the same handler set.
    pub fn matches(&self, other: &EventAddress) -> bool {
        match (self.kind, other.kind) {
            (EventKind::Stop, EventKind::Stop) => true,
            (a, b) if a == b => self.scope == other.scope,
            _ => false,
        }
    }
}

impl fmt::Display for EventAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            None => f.write_str(self.kind.as_str()),
            Some(Scope::JobWide) => write!(f, "{}@job", self.kind.as_str()),
            Some(Scope::Operation(id)) => write!(f, "{}@operation:{}", self.kind.as_str(), id),
        }
    }
}
