// src/operation/mod.rs

//! Local runtime state of one job operation.
//!
//! The remote daemon does the actual work; an [`Operation`] is the local
//! mirror the engine and UI observe. Its state is only ever changed by the
//! operation's own adapters (see [`adapters`]) and by the orchestrator's
//! job-wide handlers when it forces completion.

pub mod adapters;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::job::OperationSpec;
use crate::protocol::{OperationId, RemoteStatus, Row};

pub use adapters::OperationAdapters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationStatus {
    #[default]
    Init,
    Running,
    Paused,
    Stopped,
    Finished,
    Disposed,
    Empty,
}

/// Snapshot of an operation's flags and counters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperationState {
    pub status: OperationStatus,
    pub running: bool,
    pub paused: bool,
    pub stopped: bool,
    pub errors: u64,
    pub rows_read: u64,
    pub rows_written: u64,
}

/// Receives rows emitted downstream by an operation.
pub type RowListener = Arc<dyn Fn(&Row) -> anyhow::Result<()> + Send + Sync>;

pub struct Operation {
    id: OperationId,
    kind: String,
    state: Mutex<OperationState>,
    pending_input: AtomicUsize,
    row_listeners: Mutex<Vec<RowListener>>,
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl Operation {
    pub fn new(id: impl Into<OperationId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            state: Mutex::new(OperationState::default()),
            pending_input: AtomicUsize::new(0),
            row_listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn from_spec(spec: &OperationSpec) -> Self {
        Self::new(spec.id.clone(), spec.kind.clone())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn snapshot(&self) -> OperationState {
        self.lock().clone()
    }

    pub fn status(&self) -> OperationStatus {
        self.lock().status
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn errors(&self) -> u64 {
        self.lock().errors
    }

    pub fn rows_read(&self) -> u64 {
        self.lock().rows_read
    }

    pub fn rows_written(&self) -> u64 {
        self.lock().rows_written
    }

    /// Number of input rows still queued locally for this operation.
    pub fn pending_input(&self) -> usize {
        self.pending_input.load(Ordering::Acquire)
    }

    pub fn set_pending_input(&self, depth: usize) {
        self.pending_input.store(depth, Ordering::Release);
    }

    pub fn add_row_listener<F>(&self, listener: F)
    where
        F: Fn(&Row) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.row_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Forward one row through the local row-emission path.
    ///
    /// Every listener sees the row; the first listener error is returned
    /// after all of them have run.
    pub fn put_row(&self, row: &Row) -> anyhow::Result<()> {
        let listeners: Vec<RowListener> = self
            .row_listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut first_error = None;
        for listener in &listeners {
            if let Err(err) = listener(row) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub(crate) fn apply_remote_status(&self, remote: RemoteStatus) {
        let mut state = self.lock();
        match remote {
            RemoteStatus::Running => {
                state.status = OperationStatus::Running;
                state.running = true;
                state.paused = false;
            }
            RemoteStatus::Paused => {
                state.status = OperationStatus::Paused;
                state.paused = true;
            }
            RemoteStatus::Failed => {
                state.errors = state.errors.max(1);
                Self::stop_locked(&mut state);
            }
            RemoteStatus::Stopped => Self::stop_locked(&mut state),
            RemoteStatus::Finished => {
                state.status = OperationStatus::Finished;
                state.running = false;
                state.paused = false;
            }
        }
        debug!(operation = %self.id, ?remote, status = ?state.status, "applied remote status");
    }

    /// Apply remote row counters. Zero never overwrites, neither does a
    /// lower value than already recorded.
    pub(crate) fn record_metrics(&self, rows_in: u64, rows_out: u64) {
        let mut state = self.lock();
        if rows_in > 0 {
            state.rows_read = state.rows_read.max(rows_in);
        }
        if rows_out > 0 {
            state.rows_written = state.rows_written.max(rows_out);
        }
        trace!(
            operation = %self.id,
            rows_read = state.rows_read,
            rows_written = state.rows_written,
            "updated metrics"
        );
    }

    pub(crate) fn mark_errored_and_stopped(&self) {
        let mut state = self.lock();
        state.errors = state.errors.max(1);
        Self::stop_locked(&mut state);
    }

    pub(crate) fn mark_stopped(&self) {
        Self::stop_locked(&mut self.lock());
    }

    /// Force a still-running or halting operation into a stopped state.
    ///
    /// Returns `true` if the operation was changed.
    pub(crate) fn force_stop(&self) -> bool {
        let mut state = self.lock();
        if state.running || state.paused {
            Self::stop_locked(&mut state);
            true
        } else {
            false
        }
    }

    fn stop_locked(state: &mut OperationState) {
        state.status = OperationStatus::Stopped;
        state.stopped = true;
        state.running = false;
        state.paused = false;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OperationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_means_stopped_with_error() {
        let op = Operation::new("sort", "sort_rows");
        op.apply_remote_status(RemoteStatus::Running);
        op.apply_remote_status(RemoteStatus::Failed);

        let state = op.snapshot();
        assert_eq!(state.status, OperationStatus::Stopped);
        assert!(state.stopped);
        assert!(!state.running);
        assert_eq!(state.errors, 1);
    }

    #[test]
    fn finished_clears_running_without_stopping() {
        let op = Operation::new("read", "text_input");
        op.apply_remote_status(RemoteStatus::Running);
        op.apply_remote_status(RemoteStatus::Finished);

        assert!(!op.is_running());
        assert!(!op.is_stopped());
        assert_eq!(op.status(), OperationStatus::Finished);
    }

    #[test]
    fn late_metrics_do_not_resurrect_running() {
        let op = Operation::new("read", "text_input");
        op.apply_remote_status(RemoteStatus::Finished);
        op.record_metrics(20, 20);
        assert!(!op.is_running());
        assert_eq!(op.rows_read(), 20);
    }

    #[test]
    fn metrics_never_move_backwards() {
        let op = Operation::new("read", "text_input");
        op.record_metrics(10, 5);
        op.record_metrics(0, 0);
        op.record_metrics(3, 0);
        assert_eq!((op.rows_read(), op.rows_written()), (10, 5));
    }

    #[test]
    fn force_stop_only_touches_live_operations() {
        let done = Operation::new("a", "x");
        done.apply_remote_status(RemoteStatus::Finished);
        assert!(!done.force_stop());
        assert_eq!(done.status(), OperationStatus::Finished);

        let paused = Operation::new("b", "x");
        paused.apply_remote_status(RemoteStatus::Paused);
        assert!(paused.force_stop());
        assert!(paused.is_stopped());
    }

    #[test]
    fn put_row_reaches_every_listener() {
        let op = Operation::new("out", "x");
        let seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            op.add_row_listener(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        op.put_row(&vec![serde_json::json!(1)]).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
