// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::auth::AuthSettings;
use crate::job::{JobGraph, OperationSpec};
use crate::orchestrator::{MonitorSettings, RemoteSettings};
use crate::session::Endpoint;
use crate::types::RemoteLogLevel;

/// Job file as read from TOML, before validation.
///
/// ```toml
/// [job]
/// name = "orders"
/// log_level = "basic"
///
/// [remote]
/// host = "daemon.example.com"
/// port = 53000
/// probe_interval = "10s"
///
/// [environment]
/// INPUT_DIR = "/data/in"
///
/// [operation.read]
/// kind = "text_input"
/// path = "${INPUT_DIR}/orders.csv"
///
/// [operation.sort]
/// kind = "sort_rows"
/// after = ["read"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub job: JobSection,

    #[serde(default)]
    pub remote: RemoteSection,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Keys are operation ids.
    #[serde(default)]
    pub operation: BTreeMap<String, OperationConfig>,
}

/// `[job]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSection {
    pub name: String,

    #[serde(default)]
    pub log_level: RemoteLogLevel,

    /// Acting principal; defaults to the local user.
    #[serde(default)]
    pub principal: Option<String>,
}

/// `[remote]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub tls: bool,

    /// Kerberos principal; absent means an unauthenticated session.
    #[serde(default)]
    pub principal: Option<String>,

    #[serde(default)]
    pub keytab: Option<PathBuf>,

    #[serde(default = "default_service")]
    pub service: String,

    #[serde(default = "default_probe_interval")]
    pub probe_interval: String,

    #[serde(default = "default_max_probe_failures")]
    pub max_probe_failures: u32,

    #[serde(default = "default_monitor_shutdown_timeout")]
    pub monitor_shutdown_timeout: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    53000
}

fn default_service() -> String {
    "HTTP".to_string()
}

fn default_probe_interval() -> String {
    "10s".to_string()
}

fn default_max_probe_failures() -> u32 {
    3
}

fn default_monitor_shutdown_timeout() -> String {
    "2s".to_string()
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: false,
            principal: None,
            keytab: None,
            service: default_service(),
            probe_interval: default_probe_interval(),
            max_probe_failures: default_max_probe_failures(),
            monitor_shutdown_timeout: default_monitor_shutdown_timeout(),
        }
    }
}

/// `[operation.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationConfig {
    /// Operation type understood by the daemon.
    pub kind: String,

    #[serde(default)]
    pub after: Vec<String>,

    /// Everything else in the table, forwarded untouched.
    #[serde(flatten)]
    pub properties: BTreeMap<String, toml::Value>,
}

/// Validated job file.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so durations are
/// already parsed and operations are in dependency order.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub job: JobSection,
    pub remote: RemoteSection,
    pub environment: BTreeMap<String, String>,
    pub operation: BTreeMap<String, OperationConfig>,
    order: Vec<String>,
    probe_interval: Duration,
    monitor_shutdown_timeout: Duration,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        raw: RawConfigFile,
        order: Vec<String>,
        probe_interval: Duration,
        monitor_shutdown_timeout: Duration,
    ) -> Self {
        Self {
            job: raw.job,
            remote: raw.remote,
            environment: raw.environment,
            operation: raw.operation,
            order,
            probe_interval,
            monitor_shutdown_timeout,
        }
    }

    /// Operation ids, upstream before downstream.
    pub fn operation_order(&self) -> &[String] {
        &self.order
    }

    pub fn to_job_graph(&self) -> JobGraph {
        let mut graph = JobGraph::new(self.job.name.clone());
        graph.environment = self.environment.clone();
        graph.operations = self
            .order
            .iter()
            .filter_map(|id| self.operation.get(id).map(|op| (id, op)))
            .map(|(id, op)| OperationSpec {
                id: id.clone(),
                kind: op.kind.clone(),
                after: op.after.clone(),
                properties: op
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), toml_to_json(v)))
                    .collect(),
            })
            .collect();
        graph
    }

    pub fn remote_settings(&self) -> RemoteSettings {
        let remote = &self.remote;
        RemoteSettings {
            endpoint: Endpoint::new(remote.host.clone(), remote.port, remote.tls),
            auth: AuthSettings {
                principal: remote.principal.clone(),
                keytab: remote.keytab.clone(),
                service: remote.service.clone(),
            },
            monitor: MonitorSettings {
                interval: self.probe_interval,
                max_failures: remote.max_probe_failures,
                shutdown_timeout: self.monitor_shutdown_timeout,
            },
            log_level: self.job.log_level,
            acting_principal: self.job.principal.clone(),
        }
    }
}

/// TOML values map one-to-one onto JSON, except datetimes which become
/// their RFC 3339 string.
pub fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s.clone()),
        toml::Value::Integer(i) => serde_json::Value::from(*i),
        toml::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        toml::Value::Boolean(b) => serde_json::Value::Bool(*b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json(v)))
                .collect(),
        ),
    }
}
