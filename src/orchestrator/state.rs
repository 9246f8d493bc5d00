// src/orchestrator/state.rs

//! Shared job flags: finished, error counter, cancelling, completion.
//!
//! These are the only pieces of job state touched from more than one task
//! (caller, receive task, liveness monitor), so they are plain atomics plus a
//! one-shot completion signal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExecutionPhase {
    New,
    Prepared,
    Started,
    Finishing,
    Finished,
}

/// One-shot gate released when the job completes.
///
/// Any number of tasks may wait; the first `trigger` wins and every later
/// one is a no-op.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<bool>,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Release all waiters. Returns `true` only for the call that fired.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a
        // closed channel.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

#[derive(Debug)]
pub struct JobState {
    phase: Mutex<ExecutionPhase>,
    finished: AtomicBool,
    errors: AtomicU64,
    cancelling: AtomicBool,
    stop_requested: AtomicBool,
    completion: CompletionSignal,
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}

impl JobState {
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(ExecutionPhase::New),
            finished: AtomicBool::new(false),
            errors: AtomicU64::new(0),
            cancelling: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            completion: CompletionSignal::new(),
        }
    }

    pub fn phase(&self) -> ExecutionPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the phase forward. Phases never go backwards, so a late
    /// `Started` cannot hide an earlier `Finished`.
    pub fn advance(&self, next: ExecutionPhase) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if next > *phase {
            *phase = next;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Set the finished flag. Returns `true` if it was not set before.
    pub(crate) fn mark_finished(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }

    /// Job-level errors only; operation errors are counted separately.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Acquire)
    }

    pub(crate) fn add_errors(&self, count: u64) {
        self.errors.fetch_add(count, Ordering::AcqRel);
    }

    pub fn is_cancelling(&self) -> bool {
        self.cancelling.load(Ordering::Acquire)
    }

    pub(crate) fn set_cancelling(&self, cancelling: bool) {
        self.cancelling.store(cancelling, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn completion(&self) -> &CompletionSignal {
        &self.completion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn completion_fires_once_and_releases_all_waiters() {
        let signal = Arc::new(CompletionSignal::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let signal = Arc::clone(&signal);
                tokio::spawn(async move { signal.wait().await })
            })
            .collect();

        assert!(signal.trigger());
        assert!(!signal.trigger());

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn wait_after_trigger_returns_immediately() {
        let signal = CompletionSignal::new();
        signal.trigger();
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .unwrap();
        assert!(signal.is_triggered());
    }

    #[test]
    fn phase_never_moves_backwards() {
        let state = JobState::new();
        state.advance(ExecutionPhase::Finished);
        state.advance(ExecutionPhase::Started);
        assert_eq!(state.phase(), ExecutionPhase::Finished);
    }
}
