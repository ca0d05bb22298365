//! # In-Memory Queue
//!
//! Single-process broker used by tests and embedded deployments. One FIFO
//! per topic trivially satisfies per-key ordering; broadcast and
//! load-shared send collapse onto the same queue because a single process
//! hosts exactly one consumer group.

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::Result;
use crate::queue::{QueueConsumer, QueueProducer};

/// In-process topic FIFOs shared by producer and consumer handles
#[derive(Debug, Default)]
pub struct MemoryQueue {
    topics: DashMap<String, Mutex<VecDeque<String>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, topic: &str, payload: String) {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .lock()
            .push_back(payload);
    }

    /// Pending message count for a topic
    pub fn depth(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|q| q.lock().len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl QueueProducer for MemoryQueue {
    async fn broadcast(&self, topic: &str, payload: String) -> Result<()> {
        // one consumer group in-process: broadcast degenerates to send
        self.send(topic, payload).await
    }

    async fn send(&self, topic: &str, payload: String) -> Result<()> {
        self.send_in_order(topic, payload, "").await
    }

    async fn send_in_order(&self, topic: &str, payload: String, ordering_key: &str) -> Result<()> {
        trace!(topic, ordering_key, "enqueueing message");
        self.push(topic, payload);
        Ok(())
    }
}

#[async_trait]
impl QueueConsumer for MemoryQueue {
    async fn poll(&self, topic: &str, max: usize) -> Result<Vec<String>> {
        let Some(queue) = self.topics.get(topic) else {
            return Ok(Vec::new());
        };
        let mut queue = queue.lock();
        let take = max.min(queue.len());
        Ok(queue.drain(..take).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn poll_preserves_publish_order() {
        let queue = MemoryQueue::new();
        for i in 0..5 {
            queue
                .send_in_order("updates", format!("m{i}"), "ns")
                .await
                .unwrap();
        }

        let drained = queue.poll("updates", 10).await.unwrap();
        assert_eq!(drained, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert_eq!(queue.depth("updates"), 0);
    }

    #[tokio::test]
    async fn poll_honors_the_batch_limit() {
        let queue = MemoryQueue::new();
        for i in 0..5 {
            queue.send("updates", format!("m{i}")).await.unwrap();
        }

        assert_eq!(queue.poll("updates", 2).await.unwrap().len(), 2);
        assert_eq!(queue.depth("updates"), 3);
    }

    #[tokio::test]
    async fn unknown_topic_polls_empty() {
        let queue = MemoryQueue::new();
        assert!(queue.poll("nothing", 10).await.unwrap().is_empty());
    }
}
