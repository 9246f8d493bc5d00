// tests/config_loading.rs

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;

use remote_bridge::config::load_and_validate;
use remote_bridge::errors::BridgeError;
use remote_bridge::types::RemoteLogLevel;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn full_job_file_converts_to_graph_and_settings() {
    let file = write_config(
        r#"
[job]
name = "orders"
log_level = "detailed"
principal = "etl"

[remote]
host = "daemon.example.com"
port = 9443
tls = true
principal = "etl@EXAMPLE.COM"
keytab = "/etc/etl.keytab"
probe_interval = "500ms"
max_probe_failures = 5

[environment]
REGION = "eu"

[operation.read]
kind = "text_input"
path = "/data/orders.csv"
header = true
fields = ["id", "amount"]

[operation.sort]
kind = "sort_rows"
after = ["read"]
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    let graph = cfg.to_job_graph();
    assert_eq!(graph.name, "orders");
    assert_eq!(graph.operation_ids().collect::<Vec<_>>(), vec!["read", "sort"]);
    assert_eq!(graph.environment["REGION"], "eu");

    let read = &graph.operations[0];
    assert_eq!(read.properties["path"], "/data/orders.csv");
    assert_eq!(read.properties["header"], true);
    assert_eq!(read.properties["fields"], serde_json::json!(["id", "amount"]));
    assert!(!read.properties.contains_key("kind"));
    assert_eq!(graph.operations[1].after, vec!["read".to_string()]);

    let settings = cfg.remote_settings();
    assert_eq!(settings.endpoint.url(), "wss://daemon.example.com:9443/execution");
    assert_eq!(settings.auth.principal.as_deref(), Some("etl@EXAMPLE.COM"));
    assert_eq!(settings.auth.service, "HTTP");
    assert_eq!(settings.monitor.interval, Duration::from_millis(500));
    assert_eq!(settings.monitor.max_failures, 5);
    assert_eq!(settings.log_level, RemoteLogLevel::Detailed);
    assert_eq!(settings.principal(), "etl");
}

#[test]
fn defaults_apply_when_remote_section_is_missing() {
    let file = write_config(
        r#"
[job]
name = "minimal"

[operation.only]
kind = "generate_rows"
"#,
    );

    let settings = load_and_validate(file.path()).unwrap().remote_settings();
    assert_eq!(settings.endpoint.url(), "ws://localhost:53000/execution");
    assert!(settings.auth.principal.is_none());
    assert_eq!(settings.monitor.interval, Duration::from_secs(10));
    assert_eq!(settings.monitor.max_failures, 3);
    assert_eq!(settings.log_level, RemoteLogLevel::Basic);
}

#[test]
fn unknown_dependency_is_a_config_error() {
    let file = write_config(
        r#"
[job]
name = "broken"

[operation.sort]
kind = "sort_rows"
after = ["missing"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(BridgeError::ConfigError(msg)) => {
            assert!(msg.contains("unknown dependency 'missing'"), "{msg}");
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn dependency_cycle_is_a_graph_cycle_error() {
    let file = write_config(
        r#"
[job]
name = "loop"

[operation.a]
kind = "x"
after = ["c"]

[operation.b]
kind = "x"
after = ["a"]

[operation.c]
kind = "x"
after = ["b"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(BridgeError::GraphCycle(msg)) => assert!(msg.contains("cycle"), "{msg}"),
        other => panic!("expected GraphCycle, got {other:?}"),
    }
}

#[test]
fn job_without_operations_is_rejected() {
    let file = write_config(
        r#"
[job]
name = "empty"
"#,
    );
    assert!(matches!(
        load_and_validate(file.path()),
        Err(BridgeError::ConfigError(_))
    ));
}

#[test]
fn zero_port_and_keytab_without_principal_are_rejected() {
    let port = write_config(
        r#"
[job]
name = "j"

[remote]
port = 0

[operation.a]
kind = "x"
"#,
    );
    let err = load_and_validate(port.path()).unwrap_err();
    assert!(err.to_string().contains("port"), "{err}");

    let keytab = write_config(
        r#"
[job]
name = "j"

[remote]
keytab = "/etc/etl.keytab"

[operation.a]
kind = "x"
"#,
    );
    let err = load_and_validate(keytab.path()).unwrap_err();
    assert!(err.to_string().contains("keytab"), "{err}");
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = write_config("[job\nname = ");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(BridgeError::TomlError(_))
    ));
}
