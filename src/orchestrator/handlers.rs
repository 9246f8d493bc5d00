// src/orchestrator/handlers.rs

//! Job-wide router handlers: log, status, error and stop acknowledgement.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::errors::{BridgeError, Result};
use crate::protocol::{catalog, RemoteEvent, RemoteStatus};
use crate::router::MessageRouter;
use crate::types::RemoteLogLevel;

use super::context::JobContext;
use super::listener::LogOrigin;

pub const JOB_LOG_HANDLER: &str = "job-log-handler";
pub const JOB_STATUS_HANDLER: &str = "job-status-handler";
pub const JOB_ERROR_HANDLER: &str = "job-error-handler";
pub const JOB_STOP_HANDLER: &str = "job-stop-handler";

/// Register every job-wide handler for `ctx`.
///
/// The log handler is also registered under each operation's log address,
/// so operation-scoped lines resolve the same way as job-wide lines that
/// name an origin.
pub fn register_job_handlers(router: &MessageRouter, ctx: &Arc<JobContext>) -> Result<()> {
    let c = Arc::clone(ctx);
    router.register(catalog::job_log(), JOB_LOG_HANDLER, move |event| {
        on_log(&c, event);
        Ok(())
    })?;

    for op in ctx.operations() {
        let c = Arc::clone(ctx);
        router.register(catalog::operation_log(op.id()), JOB_LOG_HANDLER, move |event| {
            on_log(&c, event);
            Ok(())
        })?;
    }

    let c = Arc::clone(ctx);
    router.register(catalog::job_status(), JOB_STATUS_HANDLER, move |event| {
        on_status(&c, event);
        Ok(())
    })?;

    let c = Arc::clone(ctx);
    router.register(catalog::job_error(), JOB_ERROR_HANDLER, move |event| {
        on_error(&c, event);
        Ok(())
    })?;

    let c = Arc::clone(ctx);
    router.register(catalog::stop(), JOB_STOP_HANDLER, move |event| {
        on_stop(&c, event);
        Ok(())
    })?;

    Ok(())
}

fn on_log(ctx: &JobContext, event: &RemoteEvent) {
    let RemoteEvent::Log {
        scope,
        origin,
        level,
        message,
    } = event
    else {
        return;
    };

    let origin_id = origin.as_deref().or_else(|| scope.operation_id());
    match origin_id.and_then(|id| ctx.operation(id)) {
        Some(op) => {
            ctx.log(LogOrigin::Operation(op.id()), *level, message);
            if *level == RemoteLogLevel::Error {
                op.mark_errored_and_stopped();
            }
        }
        None => ctx.log(LogOrigin::Job(ctx.name()), *level, message),
    }
}

fn on_status(ctx: &JobContext, event: &RemoteEvent) {
    let RemoteEvent::Status { status, .. } = event else {
        return;
    };

    debug!(job = %ctx.name(), ?status, "job status");
    match status {
        RemoteStatus::Running => {
            ctx.listeners().started(ctx.name());
            ctx.listeners().active(ctx.name());
        }
        RemoteStatus::Failed => {
            if ctx.get_errors() == 0 {
                ctx.state().add_errors(1);
            }
            ctx.record_failure(&BridgeError::RemoteReportedError(
                "job reported as failed".to_string(),
            ));
            ctx.finish_process(true);
        }
        RemoteStatus::Finished => ctx.finish_process(true),
        RemoteStatus::Paused | RemoteStatus::Stopped => {}
    }
}

fn on_error(ctx: &JobContext, event: &RemoteEvent) {
    let RemoteEvent::Error { message, cause, .. } = event else {
        return;
    };

    ctx.state().add_errors(1);
    let err = BridgeError::RemoteReportedError(message.clone());
    ctx.record_failure(&err);

    let line = match cause {
        Some(cause) => {
            error!(job = %ctx.name(), %message, %cause, "remote daemon reported an error");
            format!("{message}: {cause}")
        }
        None => {
            error!(job = %ctx.name(), %message, "remote daemon reported an error");
            message.clone()
        }
    };
    ctx.log(LogOrigin::Job(ctx.name()), RemoteLogLevel::Error, &line);

    ctx.finish_process(true);
}

fn on_stop(ctx: &JobContext, event: &RemoteEvent) {
    let RemoteEvent::Stop { reason, errors } = event else {
        return;
    };

    // A local stop already accounted for its own outcome.
    if !ctx.state().is_cancelling() && !errors.is_empty() {
        ctx.state().add_errors(errors.len() as u64);
        for message in errors {
            ctx.log(LogOrigin::Job(ctx.name()), RemoteLogLevel::Error, message);
        }
    }

    info!(job = %ctx.name(), %reason, reported_errors = errors.len(), "remote execution stopped");
    ctx.state().completion().trigger();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use crate::orchestrator::listener::{ListenerSet, TracingLogSink};
    use crate::orchestrator::state::JobState;
    use crate::protocol::Scope;

    fn context(ops: &[&str]) -> Arc<JobContext> {
        Arc::new(JobContext::new(
            "job",
            Arc::new(JobState::new()),
            ops.iter().map(|id| Arc::new(Operation::new(*id, "x"))).collect(),
            Arc::new(ListenerSet::default()),
            Arc::new(TracingLogSink),
        ))
    }

    #[test]
    fn error_level_log_marks_origin_operation() {
        let ctx = context(&["a", "b"]);
        let router = MessageRouter::new();
        register_job_handlers(&router, &ctx).unwrap();

        router
            .dispatch(&RemoteEvent::Log {
                scope: Scope::JobWide,
                origin: Some("b".to_string()),
                level: RemoteLogLevel::Error,
                message: "disk full".to_string(),
            })
            .unwrap();

        let b = ctx.operation("b").unwrap();
        assert!(b.is_stopped());
        assert_eq!(b.errors(), 1);
        assert_eq!(ctx.operation("a").unwrap().errors(), 0);
    }

    #[test]
    fn stop_ack_counts_errors_unless_cancelling() {
        let ctx = context(&[]);
        let router = MessageRouter::new();
        register_job_handlers(&router, &ctx).unwrap();

        ctx.state().set_cancelling(true);
        router
            .dispatch(&RemoteEvent::Stop {
                reason: "user request".to_string(),
                errors: vec!["boom".to_string()],
            })
            .unwrap();
        assert_eq!(ctx.get_errors(), 0);
        assert!(ctx.state().completion().is_triggered());
    }

    #[test]
    fn remote_error_forces_completion() {
        let ctx = context(&["a"]);
        ctx.operation("a").unwrap().apply_remote_status(RemoteStatus::Running);
        let router = MessageRouter::new();
        register_job_handlers(&router, &ctx).unwrap();

        router
            .dispatch(&RemoteEvent::Error {
                scope: Scope::JobWide,
                message: "bad input".to_string(),
                cause: Some("parse".to_string()),
            })
            .unwrap();

        assert!(ctx.state().is_finished());
        assert!(ctx.operation("a").unwrap().is_stopped());
        let result = ctx.result();
        assert_eq!(result.errors, 1);
        assert!(result.failure.unwrap().contains("bad input"));
    }
}
