// src/lib.rs

pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod job;
pub mod logging;
pub mod operation;
pub mod orchestrator;
pub mod protocol;
pub mod router;
pub mod session;
pub mod types;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::job::JobGraph;
use crate::orchestrator::{JobResult, RemoteExecution, RemoteSettings};
use crate::session::{Connector, WebSocketConnector};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - job file loading and validation
/// - the orchestrator over a WebSocket session
/// - Ctrl-C handling (first: graceful stop, second: hard stop)
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;
    let graph = cfg.to_job_graph();
    let mut settings = cfg.remote_settings();
    apply_overrides(&mut settings, &args);

    if args.dry_run {
        print_dry_run(&cfg, &graph, &settings);
        return Ok(());
    }

    let connector: Arc<dyn Connector> = Arc::new(WebSocketConnector::new());
    let mut execution = RemoteExecution::new(settings, connector);
    execution.prepare(&graph)?;
    let execution = Arc::new(execution);

    execution.start().await?;

    let signals = {
        let execution = Arc::clone(&execution);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("interrupt received; stopping gracefully (Ctrl+C again to stop now)");
            if let Err(e) = execution.safe_stop().await {
                warn!(error = %e, "graceful stop failed");
            }

            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("second interrupt received; stopping now");
            if let Err(e) = execution.stop_all().await {
                warn!(error = %e, "hard stop failed");
            }
        })
    };

    execution.wait_until_finished().await?;
    signals.abort();

    if let Err(e) = execution.close("job finished").await {
        debug!(error = %e, "session already closed");
    }

    let result = execution.get_result();
    print_result(&graph.name, &result);

    if result.errors > 0 {
        return Err(anyhow!(
            "job '{}' finished with {} error(s)",
            graph.name,
            result.errors
        ));
    }
    info!(job = %graph.name, "job completed successfully");
    Ok(())
}

fn apply_overrides(settings: &mut RemoteSettings, args: &CliArgs) {
    if let Some(host) = &args.host {
        settings.endpoint.host = host.clone();
    }
    if let Some(port) = args.port {
        settings.endpoint.port = port;
    }
    if args.tls {
        settings.endpoint.tls = true;
    }
}

fn print_dry_run(cfg: &ConfigFile, graph: &JobGraph, settings: &RemoteSettings) {
    println!("remote-bridge dry-run");
    println!("  job.name = {}", graph.name);
    println!("  job.log_level = {}", settings.log_level);
    println!("  job.principal = {}", settings.principal());
    println!("  remote.url = {}", settings.endpoint.url());
    match &settings.auth.principal {
        Some(principal) => println!("  remote.auth = negotiate as {principal}"),
        None => println!("  remote.auth = none"),
    }
    println!(
        "  remote.probe = every {:?}, give up after {} failures",
        settings.monitor.interval, settings.monitor.max_failures
    );
    println!();

    for (name, value) in &graph.environment {
        println!("  env {name} = {value}");
    }
    if !graph.environment.is_empty() {
        println!();
    }

    for id in cfg.operation_order() {
        let Some(op) = cfg.operation.get(id) else {
            continue;
        };
        println!("operation {id}");
        println!("  kind  = {}", op.kind);
        if !op.after.is_empty() {
            println!("  after = {:?}", op.after);
        }
        for key in op.properties.keys() {
            println!("  prop  {key}");
        }
    }
}

fn print_result(job: &str, result: &JobResult) {
    let outcome = if result.success { "succeeded" } else { "failed" };
    println!("job {job} {outcome}");
    println!("  errors       = {}", result.errors);
    println!("  rows read    = {}", result.rows_read);
    println!("  rows written = {}", result.rows_written);
    if result.stopped {
        println!("  stopped on request");
    }
    if let Some(failure) = &result.failure {
        println!("  failure      = {failure}");
    }
}
