//! # Scheduler Service
//!
//! Top-level assembly for one replica: wires the store, the live trigger
//! registry, the configuration synchronization engine, the fire-handling
//! worker pool, and the job status notifier. Embedders construct the
//! service with their store and queue implementations, call
//! [`SchedulerService::start`], and drive job lifecycle transitions
//! through [`SchedulerService::transition_job`].

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::events::JobStatusNotifier;
use crate::models::{Job, JobId, JobStatus};
use crate::queue::QueueConsumer;
use crate::scheduling::registry::{TriggerFired, TriggerRegistry};
use crate::store::{StoreError, StoreProvider};
use crate::sync::{ApplyFailure, SyncEngine};

/// One scheduler replica
pub struct SchedulerService {
    config: SchedulerConfig,
    store: Arc<dyn StoreProvider>,
    registry: Arc<TriggerRegistry>,
    engine: Arc<SyncEngine>,
    notifier: Arc<JobStatusNotifier>,
    fire_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<TriggerFired>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerService {
    /// Assemble a replica around a store and a configuration-change
    /// consumer. The returned receiver carries events the engine could
    /// not apply, for operator triage.
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn StoreProvider>,
        consumer: Arc<dyn QueueConsumer>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ApplyFailure>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(TriggerRegistry::new(fire_tx, config.misfire_threshold_ms));
        let (engine, failure_rx) = SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            consumer,
            &config,
        );
        let service = Arc::new(Self {
            config,
            store,
            registry,
            engine,
            notifier: Arc::new(JobStatusNotifier::new()),
            fire_rx: Arc::new(tokio::sync::Mutex::new(fire_rx)),
            handles: Mutex::new(Vec::new()),
        });
        (service, failure_rx)
    }

    /// Re-register every enabled trigger already persisted in the store.
    ///
    /// Run once at replica startup, before [`start`](Self::start): a
    /// fresh replica converges from durable state first and from the
    /// event stream afterwards.
    pub async fn bootstrap(&self) -> Result<()> {
        let mut registered = 0usize;
        for namespace in self.store.namespace_store().load_all().await? {
            for trigger in self
                .store
                .trigger_store()
                .load_by_namespace(&namespace.name)
                .await?
            {
                match self.registry.register(trigger.clone()) {
                    Ok(true) => registered += 1,
                    Ok(false) => {}
                    Err(e) => {
                        // A bad persisted schedule must not wedge startup
                        warn!(trigger = %trigger.id(), error = %e, "skipping persisted trigger at bootstrap");
                    }
                }
            }
        }
        info!(registered, "bootstrapped trigger registry from store");
        Ok(())
    }

    /// Start the synchronization engine and the fire-handling workers
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            warn!("scheduler service already started");
            return;
        }

        handles.push(self.engine.start());
        for worker in 0..self.config.fire_workers.max(1) {
            let fire_rx = Arc::clone(&self.fire_rx);
            let registry = Arc::clone(&self.registry);
            let store = Arc::clone(&self.store);
            handles.push(tokio::spawn(async move {
                loop {
                    let fired = { fire_rx.lock().await.recv().await };
                    let Some(fired) = fired else {
                        debug!(worker, "fire channel closed, worker exiting");
                        break;
                    };
                    handle_fire(&registry, store.as_ref(), fired).await;
                }
            }));
        }
        info!(workers = self.config.fire_workers, "scheduler service started");
    }

    /// Cancel workers and timers. Persisted state is untouched.
    pub fn shutdown(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
        self.registry.shutdown();
        info!("scheduler service shut down");
    }

    /// Move a job through its status state machine.
    ///
    /// Illegal transitions are rejected; reaching a terminal status
    /// stamps `completed_at`. Listeners are notified after the update
    /// is persisted.
    pub async fn transition_job(&self, id: &JobId, to: JobStatus) -> Result<Job> {
        let jobs = self.store.job_store();
        let Some(mut job) = jobs.load(id).await? else {
            return Err(StoreError::new("load", format!("job '{id}' not found")).into());
        };

        let from = job.status;
        if !from.can_transition_to(to) {
            return Err(SchedulerError::InvalidStateTransition {
                job: id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        job.status = to;
        if to.is_terminal() {
            job.completed_at = Some(Utc::now());
        }
        jobs.update(job.clone()).await?;
        info!(job = %id, %from, %to, "job status transition");
        self.notifier.notify(&job, from, to);
        Ok(job)
    }

    pub fn registry(&self) -> &Arc<TriggerRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn notifier(&self) -> &Arc<JobStatusNotifier> {
        &self.notifier
    }

    pub fn store(&self) -> &Arc<dyn StoreProvider> {
        &self.store
    }
}

/// Turn one trigger fire into a persisted job.
///
/// A fire overtaken by a newer registration (reschedule raced the queue)
/// is dropped. A fire whose entry is simply gone still counts: the
/// registry only emits while a registration is live, so the absence means
/// the schedule exhausted or was removed after a legitimate fire.
async fn handle_fire(registry: &TriggerRegistry, store: &dyn StoreProvider, fired: TriggerFired) {
    if registry.is_superseded(&fired.id, fired.generation) {
        debug!(trigger = %fired.id, generation = fired.generation, "dropping superseded trigger fire");
        return;
    }

    let job = Job::new(
        fired.id.workflow.clone(),
        fired.id.name.clone(),
        fired.id.namespace.clone(),
    );
    match store.job_store().store(job.clone()).await {
        Ok(()) => {
            info!(
                trigger = %fired.id,
                job = %job.job_id(),
                scheduled = %fired.scheduled_at,
                fired = %fired.fired_at,
                "created job for trigger fire"
            );
        }
        Err(e) => {
            error!(trigger = %fired.id, error = %e, "failed to persist job for trigger fire");
        }
    }
}
