//! # Data Model
//!
//! Entities owned by the scheduling core: namespaces own workflows,
//! workflows own triggers, triggers produce jobs. Every entity serializes
//! as a full snapshot for the configuration-change wire envelope.

pub mod job;
pub mod namespace;
pub mod schedule;
pub mod workflow;
pub mod workflow_trigger;

pub use job::{Job, JobId, JobStatus};
pub use namespace::{Namespace, NamespaceId};
pub use schedule::{
    DayOfWeek, IntervalUnit, MisfireInstruction, Schedule, SimpleMisfireInstruction, TimeOfDay,
};
pub use workflow::{Workflow, WorkflowId};
pub use workflow_trigger::{WorkflowTrigger, WorkflowTriggerId};
