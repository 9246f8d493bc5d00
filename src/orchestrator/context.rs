// src/orchestrator/context.rs

//! State shared between the orchestrator, its router handlers and the
//! liveness monitor for one prepared job.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info};

use crate::errors::BridgeError;
use crate::operation::Operation;
use crate::types::RemoteLogLevel;

use super::listener::{ListenerSet, LogOrigin, LogSink};
use super::state::{ExecutionPhase, JobState};

/// Summary of a job run, as seen locally.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobResult {
    /// Job-level errors plus every operation's own error count.
    pub errors: u64,
    pub success: bool,
    pub finished: bool,
    /// A local stop (hard or safe) was requested.
    pub stopped: bool,
    pub rows_read: u64,
    pub rows_written: u64,
    /// First recorded failure, if any.
    pub failure: Option<String>,
}

pub struct JobContext {
    name: String,
    state: Arc<JobState>,
    operations: Vec<Arc<Operation>>,
    listeners: Arc<ListenerSet>,
    log_sink: Arc<dyn LogSink>,
    failure: Mutex<Option<String>>,
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("operations", &self.operations.len())
            .finish_non_exhaustive()
    }
}

impl JobContext {
    pub fn new(
        name: impl Into<String>,
        state: Arc<JobState>,
        operations: Vec<Arc<Operation>>,
        listeners: Arc<ListenerSet>,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            name: name.into(),
            state,
            operations,
            listeners,
            log_sink,
            failure: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn operations(&self) -> &[Arc<Operation>] {
        &self.operations
    }

    pub fn operation(&self, id: &str) -> Option<&Arc<Operation>> {
        self.operations.iter().find(|op| op.id() == id)
    }

    pub(crate) fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    pub(crate) fn log(&self, origin: LogOrigin<'_>, level: RemoteLogLevel, message: &str) {
        self.log_sink.log(origin, level, message);
    }

    /// Job-level error counter plus the sum of every operation's errors.
    ///
    /// Always computed fresh; operations accrue errors on their own.
    pub fn get_errors(&self) -> u64 {
        self.state.errors() + self.operations.iter().map(|op| op.errors()).sum::<u64>()
    }

    pub fn result(&self) -> JobResult {
        let errors = self.get_errors();
        JobResult {
            errors,
            success: errors == 0,
            finished: self.state.is_finished(),
            stopped: self.state.stop_requested(),
            rows_read: self.operations.iter().map(|op| op.rows_read()).sum(),
            rows_written: self.operations.iter().map(|op| op.rows_written()).sum(),
            failure: self
                .failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Keep the first failure for the job result.
    pub(crate) fn record_failure(&self, err: &BridgeError) {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if failure.is_none() {
            *failure = Some(err.to_string());
        }
    }

    /// Mark the job finished and release every waiter.
    ///
    /// Safe to call from any path and any number of times: operations are
    /// force-stopped each time it is asked for, but finished listeners only
    /// hear about the first call.
    pub(crate) fn finish_process(&self, emit_to_all_operations: bool) {
        let first = self.state.mark_finished();
        self.state.advance(ExecutionPhase::Finished);

        if emit_to_all_operations {
            let forced = self.operations.iter().filter(|op| op.force_stop()).count();
            if forced > 0 {
                debug!(job = %self.name, forced, "force-stopped operations still running");
            }
        }

        if first {
            let result = self.result();
            info!(
                job = %self.name,
                errors = result.errors,
                rows_read = result.rows_read,
                rows_written = result.rows_written,
                "job finished"
            );
            self.listeners.finished(&self.name, &result);
        }

        self.state.completion().trigger();
    }

    /// The liveness monitor gave up on the session.
    pub(crate) fn connection_lost(&self) {
        let err = BridgeError::CommunicationLost;
        self.state.add_errors(1);
        self.record_failure(&err);

        let message = err.to_string();
        error!(job = %self.name, "{message}");
        self.log(LogOrigin::Job(&self.name), RemoteLogLevel::Error, &message);

        if !self.state.is_cancelling() {
            self.finish_process(true);
        }
        self.state.completion().trigger();
    }
}
