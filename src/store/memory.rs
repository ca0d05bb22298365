//! # In-Memory Store
//!
//! DashMap-backed implementation of every store capability. Used by the
//! integration tests and by embedded single-process deployments; durable
//! backends plug in through the same traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::models::{
    Job, JobId, Namespace, NamespaceId, Workflow, WorkflowId, WorkflowTrigger, WorkflowTriggerId,
};
use crate::store::{
    JobStore, NamespaceStore, StoreError, StoreProvider, StoreResult, WorkflowStore,
    WorkflowTriggerStore,
};

/// Volatile store backend keyed by composite entity identity
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: DashMap<NamespaceId, Namespace>,
    workflows: DashMap<WorkflowId, Workflow>,
    triggers: DashMap<WorkflowTriggerId, WorkflowTrigger>,
    jobs: DashMap<JobId, Job>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreProvider for MemoryStore {
    fn namespace_store(&self) -> &dyn NamespaceStore {
        self
    }

    fn workflow_store(&self) -> &dyn WorkflowStore {
        self
    }

    fn trigger_store(&self) -> &dyn WorkflowTriggerStore {
        self
    }

    fn job_store(&self) -> &dyn JobStore {
        self
    }
}

#[async_trait]
impl NamespaceStore for MemoryStore {
    async fn store(&self, namespace: Namespace) -> StoreResult<()> {
        let id = namespace.id();
        if self.namespaces.contains_key(&id) {
            return Err(StoreError::new(
                "store",
                format!("namespace '{id}' already exists"),
            ));
        }
        self.namespaces.insert(id, namespace);
        Ok(())
    }

    async fn load(&self, id: &NamespaceId) -> StoreResult<Option<Namespace>> {
        Ok(self.namespaces.get(id).map(|ns| ns.clone()))
    }

    async fn load_all(&self) -> StoreResult<Vec<Namespace>> {
        Ok(self.namespaces.iter().map(|e| e.value().clone()).collect())
    }

    async fn update(&self, namespace: Namespace) -> StoreResult<()> {
        let id = namespace.id();
        if !self.namespaces.contains_key(&id) {
            return Err(StoreError::new(
                "update",
                format!("namespace '{id}' not found"),
            ));
        }
        self.namespaces.insert(id, namespace);
        Ok(())
    }

    async fn delete(&self, id: &NamespaceId) -> StoreResult<()> {
        self.namespaces
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::new("delete", format!("namespace '{id}' not found")))
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn store(&self, workflow: Workflow) -> StoreResult<()> {
        let id = workflow.id();
        if self.workflows.contains_key(&id) {
            return Err(StoreError::new(
                "store",
                format!("workflow '{id}' already exists"),
            ));
        }
        self.workflows.insert(id, workflow);
        Ok(())
    }

    async fn load(&self, id: &WorkflowId) -> StoreResult<Option<Workflow>> {
        Ok(self.workflows.get(id).map(|wf| wf.clone()))
    }

    async fn load_by_namespace(&self, namespace: &str) -> StoreResult<Vec<Workflow>> {
        Ok(self
            .workflows
            .iter()
            .filter(|e| e.key().namespace == namespace)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn update(&self, workflow: Workflow) -> StoreResult<()> {
        let id = workflow.id();
        if !self.workflows.contains_key(&id) {
            return Err(StoreError::new(
                "update",
                format!("workflow '{id}' not found"),
            ));
        }
        self.workflows.insert(id, workflow);
        Ok(())
    }

    async fn delete(&self, id: &WorkflowId) -> StoreResult<()> {
        self.workflows
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::new("delete", format!("workflow '{id}' not found")))
    }
}

#[async_trait]
impl WorkflowTriggerStore for MemoryStore {
    async fn store(&self, trigger: WorkflowTrigger) -> StoreResult<()> {
        let id = trigger.id();
        if self.triggers.contains_key(&id) {
            return Err(StoreError::new(
                "store",
                format!("trigger '{id}' already exists"),
            ));
        }
        self.triggers.insert(id, trigger);
        Ok(())
    }

    async fn load(&self, id: &WorkflowTriggerId) -> StoreResult<Option<WorkflowTrigger>> {
        Ok(self.triggers.get(id).map(|t| t.clone()))
    }

    async fn load_by_workflow(
        &self,
        namespace: &str,
        workflow: &str,
    ) -> StoreResult<Vec<WorkflowTrigger>> {
        Ok(self
            .triggers
            .iter()
            .filter(|e| e.key().namespace == namespace && e.key().workflow == workflow)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn load_by_namespace(&self, namespace: &str) -> StoreResult<Vec<WorkflowTrigger>> {
        Ok(self
            .triggers
            .iter()
            .filter(|e| e.key().namespace == namespace)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn update(&self, trigger: WorkflowTrigger) -> StoreResult<()> {
        let id = trigger.id();
        if !self.triggers.contains_key(&id) {
            return Err(StoreError::new(
                "update",
                format!("trigger '{id}' not found"),
            ));
        }
        self.triggers.insert(id, trigger);
        Ok(())
    }

    async fn delete(&self, id: &WorkflowTriggerId) -> StoreResult<()> {
        self.triggers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::new("delete", format!("trigger '{id}' not found")))
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn store(&self, job: Job) -> StoreResult<()> {
        let id = job.job_id();
        if self.jobs.contains_key(&id) {
            return Err(StoreError::new("store", format!("job '{id}' already exists")));
        }
        self.jobs.insert(id, job);
        Ok(())
    }

    async fn load(&self, id: &JobId) -> StoreResult<Option<Job>> {
        Ok(self.jobs.get(id).map(|j| j.clone()))
    }

    async fn update(&self, job: Job) -> StoreResult<()> {
        let id = job.job_id();
        if !self.jobs.contains_key(&id) {
            return Err(StoreError::new("update", format!("job '{id}' not found")));
        }
        self.jobs.insert(id, job);
        Ok(())
    }

    async fn delete(&self, id: &JobId) -> StoreResult<()> {
        self.jobs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::new("delete", format!("job '{id}' not found")))
    }

    async fn load_by_namespace_created_between(
        &self,
        namespace: &str,
        created_after: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Job>> {
        Ok(self
            .jobs
            .iter()
            .filter(|e| {
                e.value().namespace == namespace
                    && e.value().created_at >= created_after
                    && e.value().created_at <= created_before
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn load_by_workflow_created_between(
        &self,
        namespace: &str,
        workflow: &str,
        created_after: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Job>> {
        Ok(self
            .jobs
            .iter()
            .filter(|e| {
                e.value().namespace == namespace
                    && e.value().workflow == workflow
                    && e.value().created_at >= created_after
                    && e.value().created_at <= created_before
            })
            .map(|e| e.value().clone())
            .collect())
    }

    async fn load_by_trigger_created_between(
        &self,
        namespace: &str,
        workflow: &str,
        trigger: &str,
        created_after: DateTime<Utc>,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Job>> {
        Ok(self
            .jobs
            .iter()
            .filter(|e| {
                e.value().namespace == namespace
                    && e.value().workflow == workflow
                    && e.value().trigger == trigger
                    && e.value().created_at >= created_after
                    && e.value().created_at <= created_before
            })
            .map(|e| e.value().clone())
            .collect())
    }
}
