// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `REMOTE_BRIDGE_LOG` environment variable, either a bare level
//!    ("debug") or full directives ("remote_bridge=debug,remote=trace")
//! 3. default to `info`
//!
//! Remote log lines are emitted under the `remote` target, so they can be
//! filtered apart from the bridge's own events.
//!
//! Logs go to STDERR; stdout carries only the job summary.

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "REMOTE_BRIDGE_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(directive_for(lvl)),
        None => filter_from_env(std::env::var(LOG_ENV_VAR).ok().as_deref()),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(())
}

fn directive_for(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

fn filter_from_env(value: Option<&str>) -> EnvFilter {
    match value.map(str::trim) {
        Some(directives) if !directives.is_empty() => EnvFilter::try_new(directives)
            .unwrap_or_else(|e| {
                eprintln!("ignoring invalid {LOG_ENV_VAR}='{directives}': {e}");
                EnvFilter::new(DEFAULT_DIRECTIVE)
            }),
        _ => EnvFilter::new(DEFAULT_DIRECTIVE),
    }
}
