//! Queue transport seam. The consumer loop only talks to [`QueueTransport`];
//! JetStream backs it in production and [`InMemoryTransport`] in tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use regmobile_core::error::RegistrationResult;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One delivery of a queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport-assigned id, stable across redeliveries of the same entry.
    pub id: String,
    /// 1-based delivery count.
    pub attempt: u32,
    pub payload: Bytes,
}

impl Delivery {
    pub fn new(id: impl Into<String>, attempt: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            attempt,
            payload: payload.into(),
        }
    }
}

#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Next delivery, or `None` once the source is closed.
    async fn receive(&self) -> RegistrationResult<Option<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> RegistrationResult<()>;

    /// Return the entry to the queue, visible again after `delay`.
    async fn nack_requeue(&self, delivery: &Delivery, delay: Duration) -> RegistrationResult<()>;

    /// Move the entry to the dead-letter store with a reason code and detail.
    async fn nack_dead_letter(
        &self,
        delivery: &Delivery,
        reason: &str,
        detail: &str,
    ) -> RegistrationResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterRecord {
    pub delivery: Delivery,
    pub reason: String,
    pub detail: String,
}

/// In-process queue. Requeued entries go to the back with the attempt
/// count incremented; the requested delay is recorded but not waited on.
/// `receive` returns `None` once the queue is drained.
#[derive(Default)]
pub struct InMemoryTransport {
    queue: Mutex<VecDeque<Delivery>>,
    acked: Mutex<Vec<Delivery>>,
    requeued: Mutex<Vec<(Delivery, Duration)>>,
    dead_letters: Mutex<Vec<DeadLetterRecord>>,
    next_id: AtomicU64,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a fresh entry and return its id.
    pub fn push(&self, payload: impl Into<Bytes>) -> String {
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.queue
            .lock()
            .push_back(Delivery::new(id.clone(), 1, payload));
        id
    }

    pub fn push_json(&self, value: &serde_json::Value) -> String {
        self.push(value.to_string())
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn acked(&self) -> Vec<Delivery> {
        self.acked.lock().clone()
    }

    pub fn requeued(&self) -> Vec<(Delivery, Duration)> {
        self.requeued.lock().clone()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetterRecord> {
        self.dead_letters.lock().clone()
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn receive(&self) -> RegistrationResult<Option<Delivery>> {
        Ok(self.queue.lock().pop_front())
    }

    async fn ack(&self, delivery: &Delivery) -> RegistrationResult<()> {
        self.acked.lock().push(delivery.clone());
        Ok(())
    }

    async fn nack_requeue(&self, delivery: &Delivery, delay: Duration) -> RegistrationResult<()> {
        self.requeued.lock().push((delivery.clone(), delay));
        let mut redelivery = delivery.clone();
        redelivery.attempt += 1;
        self.queue.lock().push_back(redelivery);
        Ok(())
    }

    async fn nack_dead_letter(
        &self,
        delivery: &Delivery,
        reason: &str,
        detail: &str,
    ) -> RegistrationResult<()> {
        self.dead_letters.lock().push(DeadLetterRecord {
            delivery: delivery.clone(),
            reason: reason.to_string(),
            detail: detail.to_string(),
        });
        Ok(())
    }
}
