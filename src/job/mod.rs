// src/job/mod.rs

//! Local job description.
//!
//! A [`JobGraph`] is what the local engine hands to the orchestrator: a named
//! list of operations with their upstream dependencies, plus environment
//! variables for the run. It converts into the serialisable
//! [`JobDescription`] that travels inside the execution request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::OperationId;

/// One node of the job graph.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    pub id: OperationId,
    /// Operation type understood by the remote daemon (e.g. `"sort"`).
    pub kind: String,
    /// Upstream operations feeding this one.
    pub after: Vec<OperationId>,
    /// Free-form operation settings, forwarded untouched.
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl OperationSpec {
    pub fn new(id: impl Into<OperationId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            after: Vec::new(),
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobGraph {
    pub name: String,
    pub operations: Vec<OperationSpec>,
    pub environment: BTreeMap<String, String>,
}

impl JobGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn operations(&self) -> &[OperationSpec] {
        &self.operations
    }

    pub fn operation_ids(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|op| op.id.as_str())
    }

    /// Operations with no upstream dependency.
    pub fn sources(&self) -> impl Iterator<Item = &OperationSpec> {
        self.operations.iter().filter(|op| op.after.is_empty())
    }

    pub fn to_description(&self) -> JobDescription {
        JobDescription {
            name: self.name.clone(),
            operations: self
                .operations
                .iter()
                .map(|op| OperationDescription {
                    id: op.id.clone(),
                    kind: op.kind.clone(),
                    after: op.after.clone(),
                    properties: op.properties.clone(),
                })
                .collect(),
        }
    }
}

/// Wire form of the job graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    pub name: String,
    pub operations: Vec<OperationDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDescription {
    pub id: OperationId,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<OperationId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_keeps_operation_order_and_dependencies() {
        let mut graph = JobGraph::new("orders");
        graph.operations.push(OperationSpec::new("read", "text_input"));
        let mut sort = OperationSpec::new("sort", "sort_rows");
        sort.after.push("read".to_string());
        graph.operations.push(sort);

        let desc = graph.to_description();
        assert_eq!(desc.name, "orders");
        assert_eq!(desc.operations[0].id, "read");
        assert_eq!(desc.operations[1].after, vec!["read".to_string()]);
        assert_eq!(graph.sources().count(), 1);
    }
}
