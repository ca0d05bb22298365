//! # Configuration-Change Events
//!
//! Wire envelope for administrative mutations. Each event carries a full
//! entity snapshot, never a diff, so replay and idempotent re-apply need
//! no prior state.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Namespace, Workflow, WorkflowTrigger};

/// Administrative action carried by a configuration event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigAction {
    Create,
    Update,
    Delete,
}

/// Full entity snapshot, tagged with its kind on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "entity", rename_all = "snake_case")]
pub enum ConfigEntity {
    Namespace(Namespace),
    Workflow(Workflow),
    WorkflowTrigger(WorkflowTrigger),
}

impl ConfigEntity {
    /// Namespace owning the entity; doubles as the ordering key
    pub fn namespace(&self) -> &str {
        match self {
            ConfigEntity::Namespace(ns) => &ns.name,
            ConfigEntity::Workflow(wf) => &wf.namespace,
            ConfigEntity::WorkflowTrigger(tgr) => &tgr.namespace,
        }
    }
}

/// JSON envelope published on the configuration-change topic:
/// `{action, entity_type, entity}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub action: ConfigAction,
    #[serde(flatten)]
    pub entity: ConfigEntity,
}

impl ConfigUpdate {
    pub fn new(action: ConfigAction, entity: ConfigEntity) -> Self {
        Self { action, entity }
    }

    /// Per-namespace ordering key guaranteeing convergence order across
    /// replicas
    pub fn ordering_key(&self) -> &str {
        self.entity.namespace()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}
