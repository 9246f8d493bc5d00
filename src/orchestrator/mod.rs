// src/orchestrator/mod.rs

//! Drives one job on the remote daemon.
//!
//! [`RemoteExecution`] is the facade the local engine talks to:
//!
//! - `prepare` expands the job graph, builds the execution request and wires
//!   every handler into the router;
//! - `start` opens the session, sends the request and starts the liveness
//!   monitor;
//! - `stop_all` / `safe_stop` request a hard or graceful stop;
//! - `wait_until_finished` blocks until the job completes.
//!
//! Phases only move forward: `New → Prepared → Started → Finishing →
//! Finished`. Once running, failures never surface as errors from these
//! methods; they land in the error counter, the log sink and the job result.

pub mod context;
pub mod handlers;
pub mod listener;
pub mod monitor;
pub mod settings;
pub mod state;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info};

use crate::auth::{default_backend, GssBackend, Negotiator};
use crate::errors::{BridgeError, Result};
use crate::job::JobGraph;
use crate::operation::{Operation, OperationAdapters};
use crate::protocol::{ControlMessage, ExecutionRequest, StopMessage};
use crate::router::MessageRouter;
use crate::session::{Connector, Probe, RemoteSession, SessionState};

pub use context::{JobContext, JobResult};
pub use listener::{JobListener, ListenerSet, LogOrigin, LogSink, TracingLogSink};
pub use monitor::{MonitorHandle, MonitorSettings};
pub use settings::{current_principal, RemoteSettings};
pub use state::{CompletionSignal, ExecutionPhase, JobState};

/// Stop reason when nothing has gone wrong.
pub const STOP_REASON_USER: &str = "user request";
/// Stop reason when errors were already counted.
pub const STOP_REASON_ERROR: &str = "error reported";

/// Everything built by `prepare`.
struct Prepared {
    context: Arc<JobContext>,
    session: Arc<RemoteSession>,
    request: ExecutionRequest,
}

pub struct RemoteExecution {
    settings: RemoteSettings,
    connector: Arc<dyn Connector>,
    backend: Arc<dyn GssBackend>,
    log_sink: Arc<dyn LogSink>,
    router: Arc<MessageRouter>,
    state: Arc<JobState>,
    listeners: Arc<ListenerSet>,
    prepared: Option<Prepared>,
    started: AtomicBool,
    monitor: Mutex<Option<MonitorHandle>>,
}

impl fmt::Debug for RemoteExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteExecution")
            .field("endpoint", &self.settings.endpoint)
            .field("phase", &self.state.phase())
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}

impl RemoteExecution {
    pub fn new(settings: RemoteSettings, connector: Arc<dyn Connector>) -> Self {
        Self {
            settings,
            connector,
            backend: default_backend(),
            log_sink: Arc::new(TracingLogSink),
            router: Arc::new(MessageRouter::new()),
            state: Arc::new(JobState::new()),
            listeners: Arc::new(ListenerSet::default()),
            prepared: None,
            started: AtomicBool::new(false),
            monitor: Mutex::new(None),
        }
    }

    /// Destination for remote log lines. Takes effect at `prepare`.
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    /// GSS backend used for negotiation. Takes effect at `prepare`.
    pub fn with_gss_backend(mut self, backend: Arc<dyn GssBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn add_listener(&self, listener: Arc<dyn JobListener>) {
        self.listeners.add(listener);
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.state.phase()
    }

    pub fn operations(&self) -> &[Arc<Operation>] {
        match &self.prepared {
            Some(prepared) => prepared.context.operations(),
            None => &[],
        }
    }

    pub fn operation(&self, id: &str) -> Option<&Arc<Operation>> {
        self.prepared.as_ref()?.context.operation(id)
    }

    pub fn request(&self) -> Option<&ExecutionRequest> {
        self.prepared.as_ref().map(|p| &p.request)
    }

    pub fn session_state(&self) -> Option<SessionState> {
        self.prepared.as_ref().map(|p| p.session.state())
    }

    /// Expand `graph` into operations, build the execution request and
    /// register every handler.
    ///
    /// A registration failure (for example a duplicate operation id) is
    /// reported as `PrepareError`. The job then counts one error and is
    /// finished; a later `prepare` gets `InvalidState`.
    pub fn prepare(&mut self, graph: &JobGraph) -> Result<()> {
        if self.prepared.is_some() || self.state.phase() != ExecutionPhase::New {
            let reason = if self.prepared.is_none() && self.state.is_finished() {
                "an earlier prepare failed"
            } else {
                "job has already been prepared"
            };
            return Err(BridgeError::InvalidState(reason.to_string()));
        }

        let operations: Vec<Arc<Operation>> = graph
            .operations()
            .iter()
            .map(|spec| Arc::new(Operation::from_spec(spec)))
            .collect();

        let context = Arc::new(JobContext::new(
            graph.name.clone(),
            Arc::clone(&self.state),
            operations,
            Arc::clone(&self.listeners),
            Arc::clone(&self.log_sink),
        ));

        if let Err(err) = self.register_handlers(&context) {
            error!(job = %graph.name, error = %err, "failed to prepare remote job");
            self.state.add_errors(1);
            self.state.mark_finished();
            self.state.advance(ExecutionPhase::Finished);
            return Err(BridgeError::prepare(err));
        }

        let request = ExecutionRequest {
            job: graph.to_description(),
            environment: graph.environment.clone(),
            log_level: self.settings.log_level,
            principal: self.settings.principal(),
        };

        let negotiator = Negotiator::from_settings(&self.settings.auth, Arc::clone(&self.backend));
        let session = Arc::new(RemoteSession::new(
            self.settings.endpoint.clone(),
            negotiator,
            Arc::clone(&self.connector),
            Arc::clone(&self.router),
        ));

        info!(
            job = %graph.name,
            operations = context.operations().len(),
            principal = %request.principal,
            "prepared remote job"
        );

        self.prepared = Some(Prepared {
            context,
            session,
            request,
        });
        self.state.advance(ExecutionPhase::Prepared);
        Ok(())
    }

    fn register_handlers(&self, context: &Arc<JobContext>) -> Result<()> {
        handlers::register_job_handlers(&self.router, context)?;
        for op in context.operations() {
            OperationAdapters::register(&self.router, op)?;
        }
        Ok(())
    }

    /// Open the session (if needed), send the execution request and start
    /// the liveness monitor.
    ///
    /// Any failure here aborts the run: the job is finished with an error
    /// and the failure is returned.
    pub async fn start(&self) -> Result<()> {
        let prepared = self.prepared()?;
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(BridgeError::InvalidState(
                "job has already been started".to_string(),
            ));
        }

        let ctx = &prepared.context;
        if let Err(err) = self.open_and_execute(prepared).await {
            error!(job = %ctx.name(), error = %err, "failed to start remote job");
            ctx.state().add_errors(1);
            ctx.record_failure(&err);
            ctx.finish_process(true);
            return Err(err);
        }

        self.state.advance(ExecutionPhase::Started);
        info!(job = %ctx.name(), url = %prepared.session.endpoint().url(), "remote job started");

        let probe: Arc<dyn Probe> = prepared.session.clone();
        let handle = monitor::spawn(probe, Arc::clone(ctx), self.settings.monitor);
        *self.monitor.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    async fn open_and_execute(&self, prepared: &Prepared) -> Result<()> {
        if !prepared.session.is_open() {
            prepared.session.open().await?;
        }
        prepared
            .session
            .send(&ControlMessage::Execute(prepared.request.clone()))
            .await
    }

    /// Hard stop.
    ///
    /// Sends the stop message and, when no errors have been counted, waits
    /// for completion and forces the job finished. `cancelling` is set for
    /// the duration of the call and cleared on every exit path.
    pub async fn stop_all(&self) -> Result<()> {
        let prepared = self.prepared()?;
        let ctx = &prepared.context;

        ctx.state().set_cancelling(true);
        ctx.state().request_stop();
        ctx.state().advance(ExecutionPhase::Finishing);

        let outcome = async {
            let errors = ctx.get_errors();
            let reason = if errors == 0 {
                STOP_REASON_USER
            } else {
                STOP_REASON_ERROR
            };
            info!(job = %ctx.name(), reason, "stopping remote job");
            prepared
                .session
                .send(&ControlMessage::Stop(StopMessage::new(reason)))
                .await?;

            if errors == 0 {
                ctx.state().completion().wait().await;
                ctx.finish_process(true);
            }
            Ok(())
        }
        .await;

        ctx.state().set_cancelling(false);
        outcome
    }

    /// Graceful stop.
    ///
    /// Operations without queued input are marked stopped right away; the
    /// rest keep draining. Completion is awaited on a background task, so
    /// this returns as soon as the stop message is sent.
    pub async fn safe_stop(&self) -> Result<()> {
        let prepared = self.prepared()?;
        let ctx = Arc::clone(&prepared.context);

        ctx.state().request_stop();
        ctx.state().advance(ExecutionPhase::Finishing);
        info!(job = %ctx.name(), "requesting graceful stop");

        prepared
            .session
            .send(&ControlMessage::Stop(StopMessage::safe(STOP_REASON_USER)))
            .await?;

        for op in ctx.operations() {
            if op.pending_input() == 0 {
                op.mark_stopped();
            } else {
                debug!(operation = %op.id(), pending = op.pending_input(), "draining queued input");
            }
        }

        tokio::spawn(async move {
            ctx.state().completion().wait().await;
            ctx.finish_process(true);
        });
        Ok(())
    }

    /// Wait for the job's completion signal.
    ///
    /// Has no timeout of its own; the liveness monitor guarantees release
    /// when the daemon goes silent.
    pub async fn wait_until_finished(&self) -> Result<()> {
        let prepared = self.prepared()?;
        prepared.context.state().completion().wait().await;
        self.stop_monitor().await;
        Ok(())
    }

    /// Job-level errors plus every operation's errors.
    pub fn get_errors(&self) -> u64 {
        match &self.prepared {
            Some(prepared) => prepared.context.get_errors(),
            None => self.state.errors(),
        }
    }

    pub fn get_result(&self) -> JobResult {
        match &self.prepared {
            Some(prepared) => prepared.context.result(),
            None => JobResult {
                errors: self.state.errors(),
                success: self.state.errors() == 0,
                ..JobResult::default()
            },
        }
    }

    /// Stop the monitor and close the session if it is still open.
    pub async fn close(&self, reason: &str) -> Result<()> {
        self.stop_monitor().await;
        match &self.prepared {
            Some(prepared) if prepared.session.is_open() => prepared.session.close(reason).await,
            _ => Ok(()),
        }
    }

    async fn stop_monitor(&self) {
        let handle = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }

    fn prepared(&self) -> Result<&Prepared> {
        self.prepared
            .as_ref()
            .ok_or_else(|| BridgeError::InvalidState("job has not been prepared".to_string()))
    }
}
