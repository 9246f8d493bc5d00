// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{BridgeError, Result};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BridgeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_operations(&raw)?;
        validate_remote(&raw)?;
        validate_operation_dependencies(&raw)?;
        let order = dependency_order(&raw)?;

        let probe_interval = duration_field("probe_interval", &raw.remote.probe_interval)?;
        let shutdown_timeout =
            duration_field("monitor_shutdown_timeout", &raw.remote.monitor_shutdown_timeout)?;
        if probe_interval.is_zero() {
            return Err(BridgeError::ConfigError(
                "[remote].probe_interval must be greater than zero".to_string(),
            ));
        }

        Ok(ConfigFile::new_unchecked(raw, order, probe_interval, shutdown_timeout))
    }
}

fn ensure_has_operations(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.name.trim().is_empty() {
        return Err(BridgeError::ConfigError(
            "[job].name must not be empty".to_string(),
        ));
    }
    if cfg.operation.is_empty() {
        return Err(BridgeError::ConfigError(
            "config must contain at least one [operation.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_remote(cfg: &RawConfigFile) -> Result<()> {
    let remote = &cfg.remote;

    if remote.host.trim().is_empty() {
        return Err(BridgeError::ConfigError(
            "[remote].host must not be empty".to_string(),
        ));
    }

    if remote.port == 0 {
        return Err(BridgeError::ConfigError(
            "[remote].port must be between 1 and 65535 (got 0)".to_string(),
        ));
    }

    if remote.max_probe_failures == 0 {
        return Err(BridgeError::ConfigError(
            "[remote].max_probe_failures must be >= 1 (got 0)".to_string(),
        ));
    }

    if remote.keytab.is_some() && remote.principal.is_none() {
        return Err(BridgeError::ConfigError(
            "[remote].keytab requires [remote].principal".to_string(),
        ));
    }

    Ok(())
}

fn validate_operation_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (id, op) in cfg.operation.iter() {
        if op.kind.trim().is_empty() {
            return Err(BridgeError::ConfigError(format!(
                "operation '{id}' has an empty `kind`"
            )));
        }
        for dep in op.after.iter() {
            if dep == id {
                return Err(BridgeError::ConfigError(format!(
                    "operation '{id}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.operation.contains_key(dep) {
                return Err(BridgeError::ConfigError(format!(
                    "operation '{id}' has unknown dependency '{dep}' in `after`"
                )));
            }
        }
    }
    Ok(())
}

/// Topological order of the operations (edge: upstream -> downstream).
fn dependency_order(cfg: &RawConfigFile) -> Result<Vec<String>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for id in cfg.operation.keys() {
        graph.add_node(id.as_str());
    }
    for (id, op) in cfg.operation.iter() {
        for dep in op.after.iter() {
            graph.add_edge(dep.as_str(), id.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(BridgeError::GraphCycle(format!(
            "operation '{}' is part of a dependency cycle",
            cycle.node_id()
        ))),
    }
}

fn duration_field(field: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value)
        .map_err(|e| BridgeError::ConfigError(format!("[remote].{field}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<ConfigFile> {
        let raw: RawConfigFile = toml::from_str(toml_src)?;
        ConfigFile::try_from(raw)
    }

    #[test]
    fn orders_operations_upstream_first() {
        let cfg = parse(
            r#"
            [job]
            name = "orders"

            [operation.write]
            kind = "text_output"
            after = ["sort"]

            [operation.sort]
            kind = "sort_rows"
            after = ["read"]

            [operation.read]
            kind = "text_input"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.operation_order(), ["read", "sort", "write"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let err = parse(
            r#"
            [job]
            name = "loop"

            [operation.a]
            kind = "x"
            after = ["b"]

            [operation.b]
            kind = "x"
            after = ["a"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::GraphCycle(_)), "{err}");
    }

    #[test]
    fn zero_probe_budget_is_rejected() {
        let err = parse(
            r#"
            [job]
            name = "j"

            [remote]
            max_probe_failures = 0

            [operation.a]
            kind = "x"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_probe_failures"), "{err}");
    }

    #[test]
    fn bad_duration_is_rejected() {
        let err = parse(
            r#"
            [job]
            name = "j"

            [remote]
            probe_interval = "soon"

            [operation.a]
            kind = "x"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("probe_interval"), "{err}");
    }

    #[test]
    fn overflowing_duration_is_a_config_error() {
        let err = parse(
            r#"
            [job]
            name = "j"

            [remote]
            monitor_shutdown_timeout = "400000000000000000m"

            [operation.a]
            kind = "x"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::ConfigError(_)), "{err}");
        assert!(err.to_string().contains("monitor_shutdown_timeout"), "{err}");
    }
}
