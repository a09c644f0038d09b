//! At-least-once action queue between the reconcilers and the actuator.
//!
//! A delivery stays invisible to other consumers until it is settled with
//! exactly one of [`Queue::ack`], [`Queue::requeue`] or [`Queue::reject`].

pub mod memory;
pub mod messages;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

/// One message handed to a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: String,
    pub payload: String,
}

#[async_trait]
pub trait Queue: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;

    /// Wait up to `wait` for the next message on `topic`. A zero `wait`
    /// returns at once when nothing is pending.
    async fn next(&self, topic: &str, wait: Duration) -> Result<Option<Delivery>>;

    /// Done with the message; drop it.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Hand the message back for redelivery.
    async fn requeue(&self, delivery: &Delivery) -> Result<()>;

    /// Discard the message for good; it is parked in the dead-letter list.
    async fn reject(&self, delivery: &Delivery, reason: &str) -> Result<()>;
}

/// Serialize `message` and publish it on `topic`.
pub async fn publish_json<T: Serialize + Sync>(
    queue: &dyn Queue,
    topic: &str,
    message: &T,
) -> Result<()> {
    let payload = serde_json::to_string(message)?;
    queue.publish(topic, &payload).await
}
