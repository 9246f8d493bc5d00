// src/protocol/catalog.rs

//! Every address the bridge subscribes to.

use super::address::{EventAddress, EventKind, Scope};

pub fn job_log() -> EventAddress {
    EventAddress::new(EventKind::Log, Scope::JobWide)
}

pub fn job_status() -> EventAddress {
    EventAddress::new(EventKind::Status, Scope::JobWide)
}

pub fn job_error() -> EventAddress {
    EventAddress::new(EventKind::Error, Scope::JobWide)
}

pub fn stop() -> EventAddress {
    EventAddress::stop()
}

pub fn operation_log(id: &str) -> EventAddress {
    EventAddress::new(EventKind::Log, Scope::operation(id))
}

pub fn operation_status(id: &str) -> EventAddress {
    EventAddress::new(EventKind::Status, Scope::operation(id))
}

pub fn operation_metrics(id: &str) -> EventAddress {
    EventAddress::new(EventKind::Metrics, Scope::operation(id))
}

pub fn operation_rows(id: &str) -> EventAddress {
    EventAddress::new(EventKind::Rows, Scope::operation(id))
}
