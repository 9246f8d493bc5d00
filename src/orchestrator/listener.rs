// src/orchestrator/listener.rs

//! Hooks the local engine plugs into a remote run.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, trace, warn};

use crate::types::RemoteLogLevel;

use super::JobResult;

/// Lifecycle callbacks for one job.
///
/// `finished` may fail; failures are logged and never propagated.
pub trait JobListener: Send + Sync {
    fn started(&self, _job: &str) {}

    fn active(&self, _job: &str) {}

    fn finished(&self, _job: &str, _result: &JobResult) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Who a forwarded log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOrigin<'a> {
    Job(&'a str),
    Operation(&'a str),
}

/// Leveled log destination for remote log lines.
pub trait LogSink: Send + Sync {
    fn log(&self, origin: LogOrigin<'_>, level: RemoteLogLevel, message: &str);
}

/// Forwards remote log lines as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, origin: LogOrigin<'_>, level: RemoteLogLevel, message: &str) {
        let (job, operation) = match origin {
            LogOrigin::Job(job) => (Some(job), None),
            LogOrigin::Operation(op) => (None, Some(op)),
        };
        match level {
            RemoteLogLevel::Error => error!(target: "remote", ?job, ?operation, "{message}"),
            RemoteLogLevel::Minimal | RemoteLogLevel::Basic => {
                info!(target: "remote", ?job, ?operation, "{message}")
            }
            RemoteLogLevel::Detailed => debug!(target: "remote", ?job, ?operation, "{message}"),
            RemoteLogLevel::Debug | RemoteLogLevel::Rowlevel => {
                trace!(target: "remote", ?job, ?operation, "{message}")
            }
        }
    }
}

/// Registered job listeners, notified in registration order.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Mutex<Vec<Arc<dyn JobListener>>>,
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.snapshot().len())
            .finish()
    }
}

impl ListenerSet {
    pub fn add(&self, listener: Arc<dyn JobListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn started(&self, job: &str) {
        for listener in self.snapshot() {
            listener.started(job);
        }
    }

    pub fn active(&self, job: &str) {
        for listener in self.snapshot() {
            listener.active(job);
        }
    }

    pub fn finished(&self, job: &str, result: &JobResult) {
        for listener in self.snapshot() {
            if let Err(err) = listener.finished(job, result) {
                warn!(job, error = %err, "job finished listener failed");
            }
        }
    }

    // Listeners may add listeners; never call them under the lock.
    fn snapshot(&self) -> Vec<Arc<dyn JobListener>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
