//! # Trigger Scheduling
//!
//! Fire-instant computation ([`calculator`]) and the live per-replica
//! trigger registry ([`registry`]).

pub mod calculator;
pub mod registry;

pub use calculator::{compute_fire_plan, next_fire_after, resolve_misfire, FirePlan, MisfireAction};
pub use registry::{TriggerFired, TriggerRegistry};
