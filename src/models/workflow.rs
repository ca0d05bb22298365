//! Workflows are immutable execution templates owned by a namespace.
//!
//! The internal task-graph shape is opaque to the scheduling core; it is
//! carried as a JSON document for the execution subsystem downstream.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Composite key of a workflow: (namespace, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId {
    pub namespace: String,
    pub name: String,
}

impl WorkflowId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Execution template owned by a namespace, with zero or more triggers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Opaque task-graph definition consumed by the execution subsystem
    #[serde(default)]
    pub tasks: serde_json::Value,
}

impl Workflow {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            description: None,
            tasks: serde_json::Value::Null,
        }
    }

    pub fn id(&self) -> WorkflowId {
        WorkflowId::new(self.namespace.clone(), self.name.clone())
    }
}
