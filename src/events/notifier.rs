//! # Job Status Notifications
//!
//! Synchronous fan-out of job status transitions to registered
//! listeners. Delivery happens on the caller's task in registration
//! order; a panicking listener is isolated so it cannot take down the
//! scheduler or starve the listeners behind it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error};

use crate::models::{Job, JobStatus};

/// Observer for job status transitions.
///
/// Implementations must be fast and non-blocking: notification runs
/// inline on the scheduler's fire path.
pub trait JobStatusChangeListener: Send + Sync {
    /// Called after the transition has been persisted
    fn status_changed(&self, job: &Job, from: JobStatus, to: JobStatus);

    /// Stable name used in logs when a listener misbehaves
    fn name(&self) -> &str;
}

/// Listener registry with in-order synchronous delivery
#[derive(Default)]
pub struct JobStatusNotifier {
    listeners: RwLock<Vec<Arc<dyn JobStatusChangeListener>>>,
}

impl JobStatusNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn JobStatusChangeListener>) {
        debug!(listener = listener.name(), "registering job status listener");
        self.listeners.write().push(listener);
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Notify every listener, in registration order. Panics are caught
    /// per listener and logged; remaining listeners still run.
    pub fn notify(&self, job: &Job, from: JobStatus, to: JobStatus) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener.status_changed(job, from, to);
            }));
            if outcome.is_err() {
                error!(
                    listener = listener.name(),
                    job_id = %job.id,
                    "job status listener panicked"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl JobStatusChangeListener for Recorder {
        fn status_changed(&self, _job: &Job, from: JobStatus, to: JobStatus) {
            self.log.lock().push(format!("{}:{from}->{to}", self.label));
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    struct Panicker;

    impl JobStatusChangeListener for Panicker {
        fn status_changed(&self, _job: &Job, _from: JobStatus, _to: JobStatus) {
            panic!("listener bug");
        }

        fn name(&self) -> &str {
            "panicker"
        }
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let notifier = JobStatusNotifier::new();
        notifier.register(Arc::new(Recorder { label: "first", log: Arc::clone(&log) }));
        notifier.register(Arc::new(Recorder { label: "second", log: Arc::clone(&log) }));

        let job = Job::new("wf", "tgr", "ns");
        notifier.notify(&job, JobStatus::Created, JobStatus::Running);

        assert_eq!(
            *log.lock(),
            vec!["first:created->running", "second:created->running"]
        );
    }

    #[test]
    fn panicking_listener_does_not_block_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let notifier = JobStatusNotifier::new();
        notifier.register(Arc::new(Panicker));
        notifier.register(Arc::new(Recorder { label: "survivor", log: Arc::clone(&log) }));

        let job = Job::new("wf", "tgr", "ns");
        notifier.notify(&job, JobStatus::Running, JobStatus::Failed);

        assert_eq!(*log.lock(), vec!["survivor:running->failed"]);
    }

    #[test]
    fn clear_drops_all_listeners() {
        let notifier = JobStatusNotifier::new();
        notifier.register(Arc::new(Panicker));
        assert_eq!(notifier.listener_count(), 1);
        notifier.clear();
        assert_eq!(notifier.listener_count(), 0);

        // no listeners left to panic
        notifier.notify(&Job::new("wf", "tgr", "ns"), JobStatus::Created, JobStatus::Running);
    }
}
