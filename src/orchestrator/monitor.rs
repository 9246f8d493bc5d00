// src/orchestrator/monitor.rs

//! Liveness monitor for a running job.
//!
//! Sleeps, probes the session, and counts consecutive failures. Once the
//! count goes past the budget the session is treated as lost and the job is
//! forced to complete. The loop ends as soon as the job is finished.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::Probe;

use super::context::JobContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub interval: Duration,
    /// Consecutive probe failures tolerated before the session is lost.
    pub max_failures: u32,
    /// How long `shutdown` waits for the loop before aborting it.
    pub shutdown_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_failures: 3,
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

/// Handle to a running monitor task.
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
    timeout: Duration,
}

impl MonitorHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the loop to exit, wait a bounded time, then abort it.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if tokio::time::timeout(self.timeout, &mut self.task)
            .await
            .is_err()
        {
            warn!(timeout = ?self.timeout, "liveness monitor did not stop in time; aborting");
            self.task.abort();
        }
    }
}

/// Start the monitor loop on the tokio runtime.
pub fn spawn(probe: Arc<dyn Probe>, ctx: Arc<JobContext>, settings: MonitorSettings) -> MonitorHandle {
    let shutdown = Arc::new(Notify::new());
    let task = tokio::spawn(run(probe, ctx, settings, Arc::clone(&shutdown)));
    MonitorHandle {
        shutdown,
        task,
        timeout: settings.shutdown_timeout,
    }
}

async fn run(
    probe: Arc<dyn Probe>,
    ctx: Arc<JobContext>,
    settings: MonitorSettings,
    shutdown: Arc<Notify>,
) {
    debug!(job = %ctx.name(), interval = ?settings.interval, "liveness monitor started");
    let mut failures: u32 = 0;

    loop {
        if ctx.state().is_finished() {
            break;
        }

        if failures > settings.max_failures {
            ctx.connection_lost();
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(settings.interval) => {}
            _ = shutdown.notified() => break,
            _ = ctx.state().completion().wait() => break,
        }

        match probe.probe() {
            Ok(()) => {
                if failures > 0 {
                    info!(job = %ctx.name(), "connection to the remote daemon restored");
                }
                failures = 0;
            }
            Err(err) => {
                failures += 1;
                warn!(
                    job = %ctx.name(),
                    attempt = failures,
                    max = settings.max_failures,
                    error = %err,
                    "liveness probe failed; retrying"
                );
            }
        }
    }

    debug!(job = %ctx.name(), "liveness monitor stopped");
}
