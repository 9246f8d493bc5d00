// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `remote-bridge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "remote-bridge",
    version,
    about = "Run a job graph on a remote execution daemon and mirror its progress locally.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the job file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Job.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `REMOTE_BRIDGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the job graph, but don't contact the daemon.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[remote].host`.
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Override `[remote].port`.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Use `wss://` regardless of `[remote].tls`.
    #[arg(long)]
    pub tls: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
