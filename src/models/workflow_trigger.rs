//! Workflow triggers bind a schedule to a workflow.
//!
//! A trigger is the unit the live registry tracks: at most one live entry
//! exists per [`WorkflowTriggerId`]. Disabled triggers stay in the store
//! but never hold a registry entry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::schedule::Schedule;

/// Composite key of a trigger: (namespace, workflow, name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowTriggerId {
    pub namespace: String,
    pub workflow: String,
    pub name: String,
}

impl WorkflowTriggerId {
    pub fn new(
        namespace: impl Into<String>,
        workflow: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            workflow: workflow.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkflowTriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.workflow, self.name)
    }
}

/// Schedulable trigger producing job instances when it fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub namespace: String,
    pub workflow: String,
    pub name: String,
    pub schedule: Schedule,
    /// Epoch millis lower bound on fire instants
    #[serde(default)]
    pub start_at: Option<i64>,
    /// Epoch millis upper bound on fire instants; a trigger whose end has
    /// already passed is never registered
    #[serde(default)]
    pub end_at: Option<i64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl WorkflowTrigger {
    pub fn new(
        namespace: impl Into<String>,
        workflow: impl Into<String>,
        name: impl Into<String>,
        schedule: Schedule,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            workflow: workflow.into(),
            name: name.into(),
            schedule,
            start_at: None,
            end_at: None,
            enabled: true,
        }
    }

    pub fn id(&self) -> WorkflowTriggerId {
        WorkflowTriggerId::new(
            self.namespace.clone(),
            self.workflow.clone(),
            self.name.clone(),
        )
    }

    /// True when the end bound has already passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_at
            .is_some_and(|end| end <= now.timestamp_millis())
    }
}
