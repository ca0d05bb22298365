//! # Queue Channel Abstraction
//!
//! The three delivery semantics the synchronization engine depends on.
//! Concrete brokers are external collaborators; payloads are opaque
//! strings, topics and ordering keys are plain names.
//!
//! The configuration-change topic always publishes with
//! [`QueueProducer::send_in_order`] keyed by namespace, so every replica
//! applies one namespace's mutations in the same order.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::MemoryQueue;

#[async_trait]
pub trait QueueProducer: Send + Sync {
    /// Deliver a copy to every consumer group subscribed to the topic
    async fn broadcast(&self, topic: &str, payload: String) -> Result<()>;

    /// Deliver to exactly one consumer among all competing consumer groups
    async fn send(&self, topic: &str, payload: String) -> Result<()>;

    /// Deliver with publish-order guaranteed for payloads sharing an
    /// ordering key
    async fn send_in_order(&self, topic: &str, payload: String, ordering_key: &str) -> Result<()>;
}

#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Drain up to `max` pending payloads from the topic, in delivery
    /// order. An empty result means nothing is pending.
    async fn poll(&self, topic: &str, max: usize) -> Result<Vec<String>>;
}
