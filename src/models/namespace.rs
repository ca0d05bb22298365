//! Namespaces group workflows for isolation and ordering.
//!
//! A namespace name doubles as the ordering key for configuration-change
//! events, so all mutations under one namespace converge in order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique key of a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceId {
    pub name: String,
}

impl NamespaceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Namespace owning zero or more workflows.
///
/// Created, updated and deleted only via configuration-change events;
/// deleting a namespace cascades to every owned workflow and trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Namespace {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            description,
        }
    }

    pub fn id(&self) -> NamespaceId {
        NamespaceId::new(self.name.clone())
    }
}
