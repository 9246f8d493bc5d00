#![allow(dead_code)]

use std::time::Duration;

use remote_bridge::job::{JobGraph, OperationSpec};
use remote_bridge::orchestrator::{MonitorSettings, RemoteSettings};
use remote_bridge::session::Endpoint;

/// Builder for `JobGraph` to simplify test setup.
pub struct JobGraphBuilder {
    graph: JobGraph,
}

impl JobGraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            graph: JobGraph::new(name),
        }
    }

    pub fn operation(mut self, id: &str, kind: &str) -> Self {
        self.graph.operations.push(OperationSpec::new(id, kind));
        self
    }

    pub fn operation_after(mut self, id: &str, kind: &str, after: &[&str]) -> Self {
        let mut spec = OperationSpec::new(id, kind);
        spec.after = after.iter().map(|s| s.to_string()).collect();
        self.graph.operations.push(spec);
        self
    }

    pub fn property(mut self, key: &str, value: serde_json::Value) -> Self {
        if let Some(last) = self.graph.operations.last_mut() {
            last.properties.insert(key.to_string(), value);
        }
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.graph
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> JobGraph {
        self.graph
    }
}

/// Two-operation chain `read -> write`.
pub fn two_operation_graph() -> JobGraph {
    JobGraphBuilder::new("orders")
        .operation("read", "text_input")
        .operation_after("write", "text_output", &["read"])
        .build()
}

/// Settings pointing at a fake daemon with a fast liveness monitor.
pub fn fast_settings() -> RemoteSettings {
    let mut settings = RemoteSettings::new(Endpoint::new("daemon.test", 53000, false));
    settings.monitor = MonitorSettings {
        interval: Duration::from_millis(10),
        max_failures: 3,
        shutdown_timeout: Duration::from_millis(200),
    };
    settings.acting_principal = Some("tester".to_string());
    settings
}

/// Settings whose monitor never fires during a test.
pub fn quiet_settings() -> RemoteSettings {
    let mut settings = fast_settings();
    settings.monitor.interval = Duration::from_secs(3600);
    settings
}
