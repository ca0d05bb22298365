//! # Store Abstraction
//!
//! Capability traits for persisting the configuration and job entities.
//! Concrete backends are external collaborators; the core programs
//! against these seams and the bundled [`memory::MemoryStore`].
//!
//! Every operation fails with a single [`StoreError`] wrapping the
//! backend-specific cause; the core never inspects backend subtypes.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Job, JobId, Namespace, NamespaceId, Workflow, WorkflowId, WorkflowTrigger, WorkflowTriggerId,
};

pub use memory::MemoryStore;

/// Persistence failure wrapping the backend-specific cause
#[derive(Debug, Error)]
#[error("store operation '{operation}' failed: {message}")]
pub struct StoreError {
    pub operation: String,
    pub message: String,
}

impl StoreError {
    pub fn new(operation: impl Into<String>, message: impl ToString) -> Self {
        Self {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait NamespaceStore: Send + Sync {
    async fn store(&self, namespace: Namespace) -> StoreResult<()>;
    async fn load(&self, id: &NamespaceId) -> StoreResult<Option<Namespace>>;
    async fn load_all(&self) -> StoreResult<Vec<Namespace>>;
    async fn update(&self, namespace: Namespace) -> StoreResult<()>;
    async fn delete(&self, id: &NamespaceId) -> StoreResult<()>;
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn store(&self, workflow: Workflow) -> StoreResult<()>;
    async fn load(&self, id: &WorkflowId) -> StoreResult<Option<Workflow>>;
    async fn load_by_namespace(&self, namespace: &str) -> StoreResult<Vec<Workflow>>;
    async fn update(&self, workflow: Workflow) -> StoreResult<()>;
    async fn delete(&self, id: &WorkflowId) -> StoreResult<()>;
}

#[async_trait]
pub trait WorkflowTriggerStore: Send + Sync {
    async fn store(&self, trigger: WorkflowTrigger) -> StoreResult<()>;
    async fn load(&self, id: &WorkflowTriggerId) -> StoreResult<Option<WorkflowTrigger>>;
    async fn load_by_workflow(
        &self,
        namespace: &str,
        workflow: &str,
    ) -> StoreResult<Vec<WorkflowTrigger>>;
    async fn load_by_namespace(&self, namespace: &str) -> StoreResult<Vec<WorkflowTrigger>>;
    async fn update(&self, trigger: WorkflowTrigger) -> StoreResult<()>;
    async fn delete(&self, id: &WorkflowTriggerId) -> StoreResult<()>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn store(&self, job: Job) -> StoreResult<()>;
    async fn load(&self, id: &JobId) -> StoreResult<Option<Job>>;
    async fn update(&self, job: Job) -> StoreResult<()>;
    async fn delete(&self, id: &JobId) -> StoreResult<()>;

    /// Jobs in a namespace created inside the window
    async fn load_by_namespace_created_between(
        &self,
        namespace: &str,
        created_after: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Job>>;

    /// Jobs for one workflow created inside the window
    async fn load_by_workflow_created_between(
        &self,
        namespace: &str,
        workflow: &str,
        created_after: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Job>>;

    /// Jobs for one workflow trigger created inside the window
    async fn load_by_trigger_created_between(
        &self,
        namespace: &str,
        workflow: &str,
        trigger: &str,
        created_after: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Job>>;
}

/// Bundle of the four store capabilities one backend provides
pub trait StoreProvider: Send + Sync {
    fn namespace_store(&self) -> &dyn NamespaceStore;
    fn workflow_store(&self) -> &dyn WorkflowStore;
    fn trigger_store(&self) -> &dyn WorkflowTriggerStore;
    fn job_store(&self) -> &dyn JobStore;
}
