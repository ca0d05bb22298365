//! # Configuration Synchronization Engine
//!
//! Consumes the ordered configuration-change stream, applies each event
//! to the store and reconciles the live trigger registry. Every replica
//! runs one engine over the same event log, so all replicas converge to
//! the same active-trigger set without cross-replica locking.
//!
//! Apply steps are idempotent keyed on composite identity: duplicate
//! deliveries (at-least-once channels) are verified no-ops. A store
//! failure aborts that single event: logged and pushed to the operator
//! failure channel, never re-enqueued automatically.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::models::{Namespace, Workflow, WorkflowTrigger};
use crate::queue::QueueConsumer;
use crate::scheduling::registry::TriggerRegistry;
use crate::store::StoreProvider;
use crate::sync::events::{ConfigAction, ConfigEntity, ConfigUpdate};

/// One event the engine could not apply, surfaced to operators instead of
/// being retried in a loop
#[derive(Debug)]
pub struct ApplyFailure {
    pub payload: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Per-replica synchronization engine
pub struct SyncEngine {
    store: Arc<dyn StoreProvider>,
    registry: Arc<TriggerRegistry>,
    consumer: Arc<dyn QueueConsumer>,
    topic: String,
    poll_interval: Duration,
    poll_batch_size: usize,
    failure_tx: mpsc::UnboundedSender<ApplyFailure>,
}

impl SyncEngine {
    /// Build the engine and hand back the operator failure channel
    pub fn new(
        store: Arc<dyn StoreProvider>,
        registry: Arc<TriggerRegistry>,
        consumer: Arc<dyn QueueConsumer>,
        config: &SchedulerConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ApplyFailure>) {
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            store,
            registry,
            consumer,
            topic: config.config_updates_topic.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_batch_size: config.poll_batch_size,
            failure_tx,
        });
        (engine, failure_rx)
    }

    /// Spawn the single-threaded consumer loop. One loop per replica
    /// preserves the channel's per-key delivery order.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            info!(topic = %engine.topic, "configuration synchronization engine started");
            loop {
                match engine.consumer.poll(&engine.topic, engine.poll_batch_size).await {
                    Ok(payloads) if payloads.is_empty() => {
                        tokio::time::sleep(engine.poll_interval).await;
                    }
                    Ok(payloads) => {
                        for payload in payloads {
                            engine.apply_payload(&payload).await;
                        }
                    }
                    Err(e) => {
                        error!(topic = %engine.topic, error = %e, "failed to poll configuration updates");
                        tokio::time::sleep(engine.poll_interval).await;
                    }
                }
            }
        })
    }

    /// Decode and apply one raw payload, reporting failures without
    /// aborting the stream
    async fn apply_payload(&self, payload: &str) {
        let update = match ConfigUpdate::from_json(payload) {
            Ok(update) => update,
            Err(e) => {
                self.report_failure(payload, &e);
                return;
            }
        };
        if let Err(e) = self.apply(update).await {
            self.report_failure(payload, &e);
        }
    }

    fn report_failure(&self, payload: &str, error: &SchedulerError) {
        error!(error = %error, "configuration event rejected");
        let _ = self.failure_tx.send(ApplyFailure {
            payload: payload.to_string(),
            error: error.to_string(),
            failed_at: Utc::now(),
        });
    }

    /// Apply one configuration-change event.
    ///
    /// Public so embedded deployments and tests can drive the engine
    /// without a broker in between.
    pub async fn apply(&self, update: ConfigUpdate) -> Result<()> {
        debug!(action = ?update.action, namespace = update.ordering_key(), "applying configuration event");
        match update.entity {
            ConfigEntity::Namespace(ns) => self.apply_namespace(update.action, ns).await,
            ConfigEntity::Workflow(wf) => self.apply_workflow(update.action, wf).await,
            ConfigEntity::WorkflowTrigger(tgr) => self.apply_trigger(update.action, tgr).await,
        }
    }

    async fn apply_namespace(&self, action: ConfigAction, namespace: Namespace) -> Result<()> {
        let stores = self.store.namespace_store();
        match action {
            ConfigAction::Create => match stores.load(&namespace.id()).await? {
                Some(existing) if existing == namespace => {
                    debug!(namespace = %namespace.id(), "duplicate namespace create, no-op");
                    Ok(())
                }
                Some(_) => {
                    warn!(namespace = %namespace.id(), "create for existing namespace with different payload, applying as update");
                    Ok(stores.update(namespace).await?)
                }
                None => Ok(stores.store(namespace).await?),
            },
            ConfigAction::Update => match stores.load(&namespace.id()).await? {
                Some(_) => Ok(stores.update(namespace).await?),
                None => {
                    warn!(namespace = %namespace.id(), "update for unknown namespace, applying as create");
                    Ok(stores.store(namespace).await?)
                }
            },
            ConfigAction::Delete => self.delete_namespace(namespace).await,
        }
    }

    /// Namespace delete cascades the unregister+remove sequence over
    /// every owned workflow and trigger before the namespace itself goes
    async fn delete_namespace(&self, namespace: Namespace) -> Result<()> {
        let workflows = self
            .store
            .workflow_store()
            .load_by_namespace(&namespace.name)
            .await?;
        for workflow in workflows {
            self.delete_workflow(workflow).await?;
        }

        // Sweep triggers with no surviving workflow record
        for trigger in self
            .store
            .trigger_store()
            .load_by_namespace(&namespace.name)
            .await?
        {
            self.registry.unregister(&trigger.id());
            self.store.trigger_store().delete(&trigger.id()).await?;
        }
        self.registry.unregister_namespace(&namespace.name);

        if self
            .store
            .namespace_store()
            .load(&namespace.id())
            .await?
            .is_some()
        {
            self.store.namespace_store().delete(&namespace.id()).await?;
        }
        info!(namespace = %namespace.id(), "namespace deleted with cascade");
        Ok(())
    }

    async fn apply_workflow(&self, action: ConfigAction, workflow: Workflow) -> Result<()> {
        let stores = self.store.workflow_store();
        match action {
            ConfigAction::Create => match stores.load(&workflow.id()).await? {
                Some(existing) if existing == workflow => {
                    debug!(workflow = %workflow.id(), "duplicate workflow create, no-op");
                    Ok(())
                }
                Some(_) => {
                    warn!(workflow = %workflow.id(), "create for existing workflow with different payload, applying as update");
                    Ok(stores.update(workflow).await?)
                }
                None => Ok(stores.store(workflow).await?),
            },
            ConfigAction::Update => match stores.load(&workflow.id()).await? {
                Some(_) => Ok(stores.update(workflow).await?),
                None => {
                    warn!(workflow = %workflow.id(), "update for unknown workflow, applying as create");
                    Ok(stores.store(workflow).await?)
                }
            },
            ConfigAction::Delete => self.delete_workflow(workflow).await,
        }
    }

    async fn delete_workflow(&self, workflow: Workflow) -> Result<()> {
        for trigger in self
            .store
            .trigger_store()
            .load_by_workflow(&workflow.namespace, &workflow.name)
            .await?
        {
            self.registry.unregister(&trigger.id());
            self.store.trigger_store().delete(&trigger.id()).await?;
        }
        self.registry
            .unregister_workflow(&workflow.namespace, &workflow.name);

        if self
            .store
            .workflow_store()
            .load(&workflow.id())
            .await?
            .is_some()
        {
            self.store.workflow_store().delete(&workflow.id()).await?;
        }
        info!(workflow = %workflow.id(), "workflow deleted with cascade");
        Ok(())
    }

    async fn apply_trigger(&self, action: ConfigAction, trigger: WorkflowTrigger) -> Result<()> {
        let id = trigger.id();
        match action {
            ConfigAction::Create => {
                // Fail fast: an invalid schedule is rejected before it is
                // persisted or registered
                trigger
                    .schedule
                    .validate()
                    .map_err(|reason| SchedulerError::InvalidSchedule {
                        trigger: id.to_string(),
                        reason,
                    })?;

                match self.store.trigger_store().load(&id).await? {
                    Some(existing) if existing == trigger => {
                        debug!(trigger = %id, "duplicate trigger create");
                        // Replay convergence: make sure the live entry exists
                        if trigger.enabled && !self.registry.contains(&id) {
                            self.registry.register(trigger)?;
                        }
                        Ok(())
                    }
                    Some(_) => {
                        warn!(trigger = %id, "create for existing trigger with different payload, applying as update");
                        self.update_trigger(trigger).await
                    }
                    None => {
                        self.store.trigger_store().store(trigger.clone()).await?;
                        self.registry.register(trigger)?;
                        Ok(())
                    }
                }
            }
            ConfigAction::Update => {
                trigger
                    .schedule
                    .validate()
                    .map_err(|reason| SchedulerError::InvalidSchedule {
                        trigger: id.to_string(),
                        reason,
                    })?;
                self.update_trigger(trigger).await
            }
            ConfigAction::Delete => {
                // Read before touching the registry, and snapshot the live
                // entry, so any store failure leaves the registry in its
                // pre-event state
                let stored = self.store.trigger_store().load(&id).await?;
                let snapshot = self.registry.live_trigger(&id);
                self.registry.unregister(&id);

                if stored.is_some() {
                    if let Err(e) = self.store.trigger_store().delete(&id).await {
                        if let Some(snapshot) = snapshot {
                            let _ = self.registry.register(snapshot);
                        }
                        return Err(e.into());
                    }
                }
                Ok(())
            }
        }
    }

    /// Persist the new snapshot, then destructively re-register. An
    /// update never mutates live timer state in place.
    async fn update_trigger(&self, trigger: WorkflowTrigger) -> Result<()> {
        let id = trigger.id();
        match self.store.trigger_store().load(&id).await? {
            Some(_) => self.store.trigger_store().update(trigger.clone()).await?,
            None => {
                warn!(trigger = %id, "update for unknown trigger, applying as create");
                self.store.trigger_store().store(trigger.clone()).await?;
            }
        }
        self.registry.reschedule(trigger)?;
        Ok(())
    }
}
