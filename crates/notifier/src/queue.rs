//! Queue collaborator.
//!
//! The receive loop only needs "receive one, then settle it". [`RedisQueue`]
//! implements that on plain Redis lists with the reliable-queue pattern:
//!
//! - producers `LPUSH` payloads onto `<queue>`
//! - `BLMOVE <queue> <queue>:processing RIGHT LEFT` hands out one message and
//!   keeps a copy in flight
//! - acknowledge drops the in-flight copy
//! - abandon moves it back to the consuming end of `<queue>`
//! - dead-letter parks it on `<queue>:dead`

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use uuid::Uuid;

use herald_common::error::AppResult;

/// One message handed out by the queue.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Local identifier used to correlate log lines.
    pub id: Uuid,
    pub body: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            body,
            received_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait MessageQueue: Send {
    /// Wait up to `timeout` for one message. `Ok(None)` means nothing arrived.
    async fn receive_one(&mut self, timeout: Duration) -> AppResult<Option<RawMessage>>;

    /// Remove a processed message for good.
    async fn acknowledge(&mut self, message: &RawMessage) -> AppResult<()>;

    /// Return a message for redelivery.
    async fn abandon(&mut self, message: &RawMessage) -> AppResult<()>;

    /// Remove a message that can never be processed and keep it for inspection.
    async fn dead_letter(&mut self, message: &RawMessage) -> AppResult<()>;
}

/// Redis-list backed queue.
pub struct RedisQueue {
    redis: ConnectionManager,
    queue: String,
    processing: String,
    dead: String,
}

impl RedisQueue {
    pub fn new(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue: queue_name.to_string(),
            processing: format!("{queue_name}:processing"),
            dead: format!("{queue_name}:dead"),
        }
    }

    /// Enqueue a payload the way producers do.
    pub async fn push(&mut self, payload: &[u8]) -> AppResult<()> {
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.queue)
            .arg(payload)
            .query_async(&mut self.redis)
            .await?;
        Ok(())
    }

    /// Move every in-flight message left behind by a previous worker back onto
    /// the queue. Returns how many were moved.
    pub async fn requeue_in_flight(&mut self) -> AppResult<u64> {
        let mut moved = 0u64;
        loop {
            // Newest first, so the oldest ends up next in line.
            let payload: Option<Vec<u8>> = redis::cmd("LMOVE")
                .arg(&self.processing)
                .arg(&self.queue)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut self.redis)
                .await?;
            if payload.is_none() {
                break;
            }
            moved += 1;
        }

        if moved > 0 {
            tracing::info!(queue = %self.queue, moved, "Requeued in-flight messages");
        }
        Ok(moved)
    }

    /// Number of messages waiting in each list: (queue, processing, dead).
    pub async fn depths(&mut self) -> AppResult<(u64, u64, u64)> {
        let (queue, processing, dead): (u64, u64, u64) = redis::pipe()
            .cmd("LLEN")
            .arg(&self.queue)
            .cmd("LLEN")
            .arg(&self.processing)
            .cmd("LLEN")
            .arg(&self.dead)
            .query_async(&mut self.redis)
            .await?;
        Ok((queue, processing, dead))
    }
}

#[async_trait]
impl MessageQueue for RedisQueue {
    async fn receive_one(&mut self, timeout: Duration) -> AppResult<Option<RawMessage>> {
        let payload: Option<Vec<u8>> = redis::cmd("BLMOVE")
            .arg(&self.queue)
            .arg(&self.processing)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout.as_secs_f64())
            .query_async(&mut self.redis)
            .await?;

        Ok(payload.map(RawMessage::new))
    }

    async fn acknowledge(&mut self, message: &RawMessage) -> AppResult<()> {
        let _: i64 = redis::cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(&message.body)
            .query_async(&mut self.redis)
            .await?;
        Ok(())
    }

    async fn abandon(&mut self, message: &RawMessage) -> AppResult<()> {
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(&message.body)
            .ignore()
            .cmd("RPUSH")
            .arg(&self.queue)
            .arg(&message.body)
            .ignore()
            .query_async(&mut self.redis)
            .await?;
        Ok(())
    }

    async fn dead_letter(&mut self, message: &RawMessage) -> AppResult<()> {
        let _: () = redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(&message.body)
            .ignore()
            .cmd("LPUSH")
            .arg(&self.dead)
            .arg(&message.body)
            .ignore()
            .query_async(&mut self.redis)
            .await?;
        Ok(())
    }
}
