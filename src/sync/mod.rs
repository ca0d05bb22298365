//! # Configuration Synchronization
//!
//! The queue-driven protocol keeping every replica's in-memory trigger
//! registry consistent with administrative configuration changes.
//! [`events`] defines the wire envelope, [`engine`] consumes and applies
//! it.

pub mod engine;
pub mod events;

pub use engine::{ApplyFailure, SyncEngine};
pub use events::{ConfigAction, ConfigEntity, ConfigUpdate};
