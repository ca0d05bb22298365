//! # Event Notifications
//!
//! Outbound observer surface for scheduler-driven state changes.

pub mod notifier;

pub use notifier::{JobStatusChangeListener, JobStatusNotifier};
