use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{Delivery, Queue};
use crate::error::{Error, Result};

#[derive(Default)]
struct Topics {
    pending: HashMap<String, VecDeque<String>>,
    in_flight: HashMap<String, Vec<String>>,
    dead: Vec<(Delivery, String)>,
    acked: usize,
}

/// In-process queue with the same settle semantics as the Redis one.
#[derive(Default)]
pub struct MemoryQueue {
    topics: Mutex<Topics>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting on `topic`, oldest first.
    pub fn pending(&self, topic: &str) -> Vec<String> {
        self.topics
            .lock()
            .pending
            .get(topic)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove and return everything waiting on `topic`.
    pub fn drain(&self, topic: &str) -> Vec<String> {
        self.topics
            .lock()
            .pending
            .get_mut(topic)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn in_flight(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .in_flight
            .get(topic)
            .map_or(0, Vec::len)
    }

    pub fn dead_letters(&self) -> Vec<(Delivery, String)> {
        self.topics.lock().dead.clone()
    }

    pub fn acked(&self) -> usize {
        self.topics.lock().acked
    }

    fn take(&self, topic: &str) -> Option<String> {
        let mut topics = self.topics.lock();
        let payload = topics.pending.get_mut(topic)?.pop_front()?;
        topics
            .in_flight
            .entry(topic.to_string())
            .or_default()
            .push(payload.clone());
        Some(payload)
    }

    fn settle(&self, delivery: &Delivery) -> Result<()> {
        let mut topics = self.topics.lock();
        let in_flight = topics.in_flight.entry(delivery.topic.clone()).or_default();
        let pos = in_flight
            .iter()
            .position(|p| *p == delivery.payload)
            .ok_or_else(|| Error::not_found("delivery is not in flight"))?;
        in_flight.remove(pos);
        Ok(())
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        self.topics
            .lock()
            .pending
            .entry(topic.to_string())
            .or_default()
            .push_back(payload.to_string());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn next(&self, topic: &str, wait: Duration) -> Result<Option<Delivery>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            if let Some(payload) = self.take(topic) {
                return Ok(Some(Delivery {
                    topic: topic.to_string(),
                    payload,
                }));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.settle(delivery)?;
        self.topics.lock().acked += 1;
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<()> {
        self.settle(delivery)?;
        self.publish(&delivery.topic, &delivery.payload).await
    }

    async fn reject(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        self.settle(delivery)?;
        self.topics
            .lock()
            .dead
            .push((delivery.clone(), reason.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivery_is_hidden_until_settled() {
        let queue = MemoryQueue::new();
        queue.publish("roles", "a").await.unwrap();

        let d = queue
            .next("roles", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(d.payload, "a");
        assert!(queue
            .next("roles", Duration::from_millis(10))
            .await
            .unwrap()
            .is_none());
        assert_eq!(queue.in_flight("roles"), 1);

        queue.requeue(&d).await.unwrap();
        assert_eq!(queue.pending("roles"), vec!["a".to_string()]);
        assert_eq!(queue.in_flight("roles"), 0);
    }

    #[tokio::test]
    async fn zero_wait_does_not_block() {
        let queue = MemoryQueue::new();
        let empty = tokio::time::timeout(Duration::from_millis(100), queue.next("roles", Duration::ZERO))
            .await
            .expect("zero wait returned at once");
        assert!(empty.unwrap().is_none());

        queue.publish("roles", "a").await.unwrap();
        let d = queue.next("roles", Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(d.payload, "a");
    }

    #[tokio::test]
    async fn waiting_consumer_is_woken_by_publish() {
        let queue = std::sync::Arc::new(MemoryQueue::new());
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next("members", Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        queue.publish("members", "m").await.unwrap();

        let d = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(d.payload, "m");
    }

    #[tokio::test]
    async fn reject_parks_in_dead_letters() {
        let queue = MemoryQueue::new();
        queue.publish("roles", "bad").await.unwrap();
        let d = queue
            .next("roles", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();

        queue.reject(&d, "unparsable").await.unwrap();

        assert_eq!(queue.dead_letters().len(), 1);
        assert!(queue.ack(&d).await.is_err());
    }
}
