//! # Tempo Core
//!
//! Distributed workflow scheduling core: trigger schedule computation and
//! queue-driven configuration synchronization for replicated scheduler
//! deployments.
//!
//! ## Overview
//!
//! Every replica holds the full set of schedulable triggers in an
//! in-memory registry and arms one timer per trigger. Administrative
//! changes (namespaces, workflows, triggers) are published as full-snapshot
//! events on an ordered queue topic; each replica's synchronization engine
//! applies them to its store and registry, so all replicas converge
//! without cross-replica coordination.
//!
//! ## Key Components
//!
//! - [`models`]: namespaces, workflows, triggers, schedules, and jobs
//! - [`scheduling`]: fire-time calculation, misfire resolution, and the
//!   live trigger registry
//! - [`sync`]: the configuration-change envelope and the per-replica
//!   synchronization engine
//! - [`store`] / [`queue`]: trait seams for durable storage and broker
//!   transports, with in-memory implementations for tests and embedded use
//! - [`service`]: one-stop replica assembly
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tempo_core::config::SchedulerConfig;
//! use tempo_core::queue::MemoryQueue;
//! use tempo_core::service::SchedulerService;
//! use tempo_core::store::MemoryStore;
//!
//! # async fn run() -> tempo_core::error::Result<()> {
//! let (service, _failures) = SchedulerService::new(
//!     SchedulerConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryQueue::new()),
//! );
//! service.bootstrap().await?;
//! service.start();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod queue;
pub mod scheduling;
pub mod service;
pub mod store;
pub mod sync;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use service::SchedulerService;
