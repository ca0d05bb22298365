//! # Live Trigger Registry
//!
//! The shared in-memory registry of schedulable triggers for one replica.
//! Configuration apply and the timer-firing path both mutate it; dashmap
//! entry locks serialize operations on the same trigger identity while
//! distinct identities proceed in parallel. No cross-replica locking:
//! every replica converges independently from the same ordered event log.
//!
//! Invariant: at most one live entry per [`WorkflowTriggerId`]. Each
//! registration carries a generation counter; a queued fire overtaken by
//! a newer registration is dropped downstream by generation mismatch,
//! while a fire emitted by a registration that has since exhausted still
//! counts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::models::{Schedule, WorkflowTrigger, WorkflowTriggerId};
use crate::scheduling::calculator::{self, MisfireAction};

/// Emitted on the fire channel each time a live trigger fires
#[derive(Debug, Clone)]
pub struct TriggerFired {
    pub id: WorkflowTriggerId,
    /// Registration generation; consumers drop fires whose generation no
    /// longer matches the live entry
    pub generation: u64,
    pub scheduled_at: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
}

struct LiveTrigger {
    trigger: WorkflowTrigger,
    generation: u64,
    /// Set right after the timer task is spawned; `None` only inside the
    /// registration critical section
    timer: Option<JoinHandle<()>>,
}

impl Drop for LiveTrigger {
    fn drop(&mut self) {
        // Removal from the registry always cancels the pending timer
        if let Some(timer) = &self.timer {
            timer.abort();
        }
    }
}

/// Registry of live triggers with one timer task per entry
pub struct TriggerRegistry {
    entries: Arc<DashMap<WorkflowTriggerId, LiveTrigger>>,
    fire_tx: mpsc::UnboundedSender<TriggerFired>,
    next_generation: AtomicU64,
    misfire_threshold: Duration,
}

impl TriggerRegistry {
    pub fn new(fire_tx: mpsc::UnboundedSender<TriggerFired>, misfire_threshold_ms: i64) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            fire_tx,
            next_generation: AtomicU64::new(1),
            misfire_threshold: Duration::milliseconds(misfire_threshold_ms.max(0)),
        }
    }

    /// Register a trigger and arm its timer.
    ///
    /// Returns `Ok(false)` without registering when the trigger is
    /// disabled, expired, or its schedule computes no future fire; all
    /// are no-ops by contract. Schedule validation errors propagate and the
    /// trigger never enters the registry. A duplicate registration
    /// replaces (and cancels) the previous live entry.
    pub fn register(&self, trigger: WorkflowTrigger) -> Result<bool> {
        let id = trigger.id();
        if !trigger.enabled {
            debug!(trigger = %id, "skipping registration of disabled trigger");
            return Ok(false);
        }

        let now = Utc::now();
        let Some(plan) = calculator::compute_fire_plan(&trigger, now)? else {
            debug!(trigger = %id, "trigger computes no future fire, not registering");
            return Ok(false);
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        // The entry goes in before the timer starts, so an immediately
        // firing timer always finds its own registration. insert holds the
        // entry lock, serializing same-identity updates; dropping a
        // previous entry aborts its timer.
        self.entries.insert(
            id.clone(),
            LiveTrigger {
                trigger: trigger.clone(),
                generation,
                timer: None,
            },
        );

        let ctx = TimerContext {
            entries: Arc::clone(&self.entries),
            id: id.clone(),
            generation,
            trigger,
            fire_tx: self.fire_tx.clone(),
            misfire_threshold: self.misfire_threshold,
        };
        let timer = tokio::spawn(run_timer(ctx, plan.next_fire));

        match self.entries.get_mut(&id) {
            Some(mut live) if live.generation == generation => live.timer = Some(timer),
            // Unregistered or replaced between insert and spawn
            _ => timer.abort(),
        }
        info!(trigger = %id, next_fire = %plan.next_fire, "registered trigger");
        Ok(true)
    }

    /// Unregister and re-register with freshly computed fire instants.
    ///
    /// Always destructive-then-recreate, never an in-place mutation of
    /// live timer state.
    pub fn reschedule(&self, trigger: WorkflowTrigger) -> Result<bool> {
        self.unregister(&trigger.id());
        self.register(trigger)
    }

    /// Remove a trigger, cancelling any pending timer atomically with the
    /// registry removal
    pub fn unregister(&self, id: &WorkflowTriggerId) -> bool {
        if self.entries.remove(id).is_some() {
            info!(trigger = %id, "unregistered trigger");
            true
        } else {
            false
        }
    }

    /// Unregister every trigger owned by a workflow; returns the count
    pub fn unregister_workflow(&self, namespace: &str, workflow: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|id, _| {
            if id.namespace == namespace && id.workflow == workflow {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            info!(namespace, workflow, removed, "unregistered workflow triggers");
        }
        removed
    }

    /// Unregister every trigger under a namespace; returns the count
    pub fn unregister_namespace(&self, namespace: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|id, _| {
            if id.namespace == namespace {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            info!(namespace, removed, "unregistered namespace triggers");
        }
        removed
    }

    pub fn contains(&self, id: &WorkflowTriggerId) -> bool {
        self.entries.contains_key(id)
    }

    /// True when `generation` matches the current live entry for `id`
    pub fn is_current(&self, id: &WorkflowTriggerId, generation: u64) -> bool {
        self.entries
            .get(id)
            .is_some_and(|live| live.generation == generation)
    }

    /// True when a newer registration for `id` replaced `generation`.
    ///
    /// Fire consumers drop superseded events. An absent entry is NOT
    /// superseded: the fire was emitted while its registration was live,
    /// and a schedule that exhausted after emitting removes its own entry
    /// before the fire is consumed.
    pub fn is_superseded(&self, id: &WorkflowTriggerId, generation: u64) -> bool {
        self.entries
            .get(id)
            .is_some_and(|live| live.generation != generation)
    }

    /// Snapshot of the live trigger definition, if registered
    pub fn live_trigger(&self, id: &WorkflowTriggerId) -> Option<WorkflowTrigger> {
        self.entries.get(id).map(|live| live.trigger.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cancel every timer and clear the registry
    pub fn shutdown(&self) {
        let count = self.entries.len();
        self.entries.clear();
        if count > 0 {
            info!(cancelled = count, "trigger registry shut down");
        }
    }
}

struct TimerContext {
    entries: Arc<DashMap<WorkflowTriggerId, LiveTrigger>>,
    id: WorkflowTriggerId,
    generation: u64,
    trigger: WorkflowTrigger,
    fire_tx: mpsc::UnboundedSender<TriggerFired>,
    misfire_threshold: Duration,
}

impl TimerContext {
    /// Whether this timer's registration is still the live entry
    fn is_live(&self) -> bool {
        self.entries
            .get(&self.id)
            .is_some_and(|live| live.generation == self.generation)
    }

    fn emit(&self, scheduled_at: DateTime<Utc>, fired_at: DateTime<Utc>) -> bool {
        self.fire_tx
            .send(TriggerFired {
                id: self.id.clone(),
                generation: self.generation,
                scheduled_at,
                fired_at,
            })
            .is_ok()
    }
}

/// Timer loop for one registration: sleep to the next fire instant, emit,
/// recompute, re-arm. Exits when the schedule is exhausted, the end bound
/// clips the next occurrence, or the fire channel closes.
async fn run_timer(ctx: TimerContext, first_fire: DateTime<Utc>) {
    let schedule = ctx.trigger.schedule.clone();
    let mut next = first_fire;
    let mut fires: u32 = 0;

    loop {
        let wait = next - Utc::now();
        if wait > Duration::zero() {
            tokio::time::sleep(wait.to_std().unwrap_or_default()).await;
        }

        // Emit only while this registration is still the live one; a
        // replaced or removed registration stops firing here
        if !ctx.is_live() {
            return;
        }

        let now = Utc::now();
        // Anchor for the next computation: fixed delay follows the actual
        // fire, everything else follows the scheduled instant
        let mut previous = if matches!(schedule, Schedule::Fixed { .. }) {
            now
        } else {
            next
        };
        let mut after = now;

        if now - next > ctx.misfire_threshold {
            match calculator::resolve_misfire(&schedule) {
                MisfireAction::FireNow => {
                    if !ctx.emit(next, now) {
                        return;
                    }
                    fires = fires.saturating_add(1);
                    if calculator::misfire_consumes_missed(&schedule) {
                        let missed = calculator::missed_occurrences(&schedule, next, now);
                        fires = fires.saturating_add(missed.saturating_sub(1));
                    }
                    previous = now;
                }
                MisfireAction::SkipToNext => {
                    debug!(trigger = %ctx.id, scheduled = %next, "dropping misfired occurrence");
                    if calculator::misfire_consumes_missed(&schedule) {
                        fires = fires
                            .saturating_add(calculator::missed_occurrences(&schedule, next, now));
                    }
                    // Jump past the whole run of missed occurrences
                    previous = calculator::last_missed_occurrence(&schedule, next, now);
                }
                MisfireAction::Ignore => {
                    if !ctx.emit(next, now) {
                        return;
                    }
                    fires = fires.saturating_add(1);
                    // Recompute as if the fire had been on time, so every
                    // overdue occurrence still fires
                    after = next;
                }
            }
        } else {
            if !ctx.emit(next, now) {
                return;
            }
            fires = fires.saturating_add(1);
        }

        match calculator::next_fire_after(&ctx.trigger, previous, fires, after) {
            Ok(Some(upcoming)) => next = upcoming,
            Ok(None) => {
                debug!(trigger = %ctx.id, fires, "trigger schedule exhausted");
                break;
            }
            Err(e) => {
                error!(trigger = %ctx.id, error = %e, "removing trigger after fatal fire computation");
                break;
            }
        }
    }

    // Self-removal only when this registration is still the live one
    ctx.entries
        .remove_if(&ctx.id, |_, live| live.generation == ctx.generation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::schedule::SimpleMisfireInstruction;
    use std::time::Duration as StdDuration;
    use tokio::time::timeout;

    fn fixed_trigger(name: &str, interval_ms: i64) -> WorkflowTrigger {
        WorkflowTrigger::new("ns", "wf", name, Schedule::Fixed { interval_ms })
    }

    fn registry() -> (TriggerRegistry, mpsc::UnboundedReceiver<TriggerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TriggerRegistry::new(tx, 60_000), rx)
    }

    #[tokio::test]
    async fn registered_fixed_trigger_fires() {
        let (registry, mut rx) = registry();
        assert!(registry.register(fixed_trigger("fast", 20)).unwrap());
        assert_eq!(registry.len(), 1);

        let fired = timeout(StdDuration::from_secs(2), rx.recv())
            .await
            .expect("trigger should fire")
            .expect("channel open");
        assert_eq!(fired.id, fixed_trigger("fast", 20).id());
        assert!(registry.is_current(&fired.id, fired.generation));
    }

    #[tokio::test]
    async fn disabled_trigger_is_not_registered() {
        let (registry, _rx) = registry();
        let mut trigger = fixed_trigger("off", 20);
        trigger.enabled = false;
        assert!(!registry.register(trigger).unwrap());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn expired_trigger_is_a_noop() {
        let (registry, _rx) = registry();
        let mut trigger = fixed_trigger("expired", 1_000);
        trigger.end_at = Some(Utc::now().timestamp_millis() - 1_000);
        assert!(!registry.register(trigger).unwrap());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_a_single_entry() {
        let (registry, _rx) = registry();
        let trigger = fixed_trigger("dup", 60_000);
        assert!(registry.register(trigger.clone()).unwrap());
        assert!(registry.register(trigger.clone()).unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn unregister_cancels_pending_fires() {
        let (registry, mut rx) = registry();
        let trigger = fixed_trigger("gone", 500);
        let id = trigger.id();
        registry.register(trigger).unwrap();
        assert!(registry.unregister(&id));
        assert!(registry.is_empty());

        // Nothing fires after removal
        let fired = timeout(StdDuration::from_millis(200), rx.recv()).await;
        assert!(fired.is_err() || fired.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_generation_is_detected_after_reschedule() {
        let (registry, _rx) = registry();
        let trigger = fixed_trigger("swap", 60_000);
        let id = trigger.id();
        registry.register(trigger.clone()).unwrap();
        let old_generation = {
            let entry = registry.entries.get(&id).unwrap();
            entry.generation
        };

        registry.reschedule(trigger).unwrap();
        assert!(!registry.is_current(&id, old_generation));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn namespace_unregister_sweeps_all_owned_triggers() {
        let (registry, _rx) = registry();
        registry.register(fixed_trigger("a", 60_000)).unwrap();
        registry.register(fixed_trigger("b", 60_000)).unwrap();
        registry
            .register(WorkflowTrigger::new(
                "other",
                "wf",
                "c",
                Schedule::Fixed { interval_ms: 60_000 },
            ))
            .unwrap();

        assert_eq!(registry.unregister_namespace("ns"), 2);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn simple_one_shot_fires_once_and_leaves_the_registry() {
        let (registry, mut rx) = registry();
        let trigger = WorkflowTrigger::new(
            "ns",
            "wf",
            "once",
            Schedule::Simple {
                repeat_interval_ms: 0,
                repeat_count: 0,
                repeat_forever: false,
                misfire_instruction: SimpleMisfireInstruction::default(),
            },
        );
        let id = trigger.id();
        registry.register(trigger).unwrap();

        let fired = timeout(StdDuration::from_secs(2), rx.recv())
            .await
            .expect("one-shot should fire")
            .expect("channel open");
        assert_eq!(fired.id, id);

        // No second fire; the timer removes its own entry
        let second = timeout(StdDuration::from_millis(200), rx.recv()).await;
        assert!(second.is_err());
        assert!(!registry.contains(&id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn immediate_one_shots_never_leave_dead_entries() {
        // A timer with no future wait can run to completion in parallel
        // with registration; the entry must still drain afterwards
        let (registry, mut rx) = registry();
        for i in 0..20 {
            let trigger = WorkflowTrigger::new(
                "ns",
                "wf",
                format!("shot-{i}"),
                Schedule::Simple {
                    repeat_interval_ms: 0,
                    repeat_count: 0,
                    repeat_forever: false,
                    misfire_instruction: SimpleMisfireInstruction::default(),
                },
            );
            registry.register(trigger).unwrap();
        }

        for _ in 0..20 {
            timeout(StdDuration::from_secs(2), rx.recv())
                .await
                .expect("every one-shot fires")
                .expect("channel open");
        }

        let deadline = tokio::time::Instant::now() + StdDuration::from_secs(2);
        while !registry.is_empty() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "exhausted one-shots left stale registry entries"
            );
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
    }
}
