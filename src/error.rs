//! # Scheduler Error Types
//!
//! Structured error handling for the scheduling core using thiserror
//! for typed error variants instead of `Box<dyn Error>` patterns.

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised by the scheduling and configuration synchronization core
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Raised at registration time for malformed cron expressions,
    /// non-positive intervals or unknown timezones. A trigger that fails
    /// schedule validation never enters the live registry.
    #[error("invalid schedule for trigger '{trigger}': {reason}")]
    InvalidSchedule { trigger: String, reason: String },

    /// Wraps any persistence failure. The core never inspects
    /// backend-specific error subtypes.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Catastrophic clock skew: a computed next-fire instant precedes the
    /// trigger's start bound. Fatal for that trigger.
    #[error("misfire resolution failed for trigger '{trigger}': {reason}")]
    MisfireResolution { trigger: String, reason: String },

    #[error("queue operation failed on topic '{topic}': {message}")]
    Queue { topic: String, message: String },

    #[error("invalid status transition for job '{job}': {from} -> {to}")]
    InvalidStateTransition {
        job: String,
        from: String,
        to: String,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("event serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_schedule_display_names_the_trigger() {
        let err = SchedulerError::InvalidSchedule {
            trigger: "ns:wf:tgr".to_string(),
            reason: "repeat interval must be positive".to_string(),
        };
        assert!(err.to_string().contains("ns:wf:tgr"));
        assert!(err.to_string().contains("repeat interval"));
    }

    #[test]
    fn store_error_is_transparent() {
        let err: SchedulerError = StoreError::new("load", "connection refused").into();
        assert_eq!(
            err.to_string(),
            "store operation 'load' failed: connection refused"
        );
    }
}
