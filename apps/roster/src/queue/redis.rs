//! Redis reliable-list queue.
//!
//! Per topic: `{prefix}:{topic}` holds pending messages, `BLMOVE` shifts one
//! into `{prefix}:{topic}:processing` while it is worked on, and settling
//! removes it from there. Rejected messages go to `{prefix}:{topic}:dead`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::AsyncCommands;

use super::{Delivery, Queue};
use crate::error::Result;

/// Connections parked between blocking polls. A connection is only returned
/// after a command succeeded on it.
#[derive(Clone)]
struct IdlePool<T> {
    idle: Arc<Mutex<Vec<T>>>,
    max_idle: usize,
}

impl<T> IdlePool<T> {
    fn new(max_idle: usize) -> Self {
        Self {
            idle: Arc::new(Mutex::new(Vec::new())),
            max_idle,
        }
    }

    fn take(&self) -> Option<T> {
        self.idle.lock().pop()
    }

    fn put(&self, conn: T) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}

#[derive(Clone)]
pub struct RedisQueue {
    client: redis::Client,
    conn: ConnectionManager,
    blocking: IdlePool<MultiplexedConnection>,
    prefix: String,
}

const MAX_IDLE_BLOCKING: usize = 8;

impl RedisQueue {
    pub async fn connect(url: &str, prefix: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        tracing::info!(%prefix, "redis queue connected");
        Ok(Self {
            client,
            conn,
            blocking: IdlePool::new(MAX_IDLE_BLOCKING),
            prefix: prefix.to_string(),
        })
    }

    fn pending_key(&self, topic: &str) -> String {
        format!("{}:{topic}", self.prefix)
    }

    fn processing_key(&self, topic: &str) -> String {
        format!("{}:{topic}:processing", self.prefix)
    }

    fn dead_key(&self, topic: &str) -> String {
        format!("{}:{topic}:dead", self.prefix)
    }

    /// Return messages left in the processing list by a crashed consumer.
    /// Only safe before any worker of this topic is started.
    pub async fn recover(&self, topic: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut moved = 0;
        loop {
            let item: Option<String> = redis::cmd("LMOVE")
                .arg(self.processing_key(topic))
                .arg(self.pending_key(topic))
                .arg("RIGHT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            if item.is_none() {
                break;
            }
            moved += 1;
        }
        if moved > 0 {
            tracing::info!(%topic, moved, "recovered unsettled messages");
        }
        Ok(moved)
    }

    async fn settle(&self, delivery: &Delivery, target: Option<String>) -> Result<()> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .lrem(self.processing_key(&delivery.topic), 1, &delivery.payload)
            .ignore();
        if let Some(target) = target {
            pipe.lpush(target, &delivery.payload).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(self.pending_key(topic), payload)
            .await?;
        Ok(())
    }

    async fn next(&self, topic: &str, wait: Duration) -> Result<Option<Delivery>> {
        if wait.is_zero() {
            let mut conn = self.conn.clone();
            let payload: Option<String> = redis::cmd("LMOVE")
                .arg(self.pending_key(topic))
                .arg(self.processing_key(topic))
                .arg("RIGHT")
                .arg("LEFT")
                .query_async(&mut conn)
                .await?;
            return Ok(payload.map(|payload| Delivery {
                topic: topic.to_string(),
                payload,
            }));
        }

        // Blocking commands run on their own connection so they do not stall
        // publishes multiplexed on the shared manager.
        let mut conn = match self.blocking.take() {
            Some(conn) => conn,
            None => self.client.get_multiplexed_async_connection().await?,
        };
        let payload: Option<String> = redis::cmd("BLMOVE")
            .arg(self.pending_key(topic))
            .arg(self.processing_key(topic))
            .arg("RIGHT")
            .arg("LEFT")
            .arg(wait.as_secs_f64())
            .query_async(&mut conn)
            .await?;
        self.blocking.put(conn);

        Ok(payload.map(|payload| Delivery {
            topic: topic.to_string(),
            payload,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.settle(delivery, None).await
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<()> {
        self.settle(delivery, Some(self.pending_key(&delivery.topic)))
            .await
    }

    async fn reject(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        tracing::warn!(topic = %delivery.topic, %reason, "message dead-lettered");
        self.settle(delivery, Some(self.dead_key(&delivery.topic)))
            .await
    }
}
