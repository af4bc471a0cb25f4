//! In-memory audit queue for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

use crate::channel::{AuditSource, AuditTransport, DeadLetter, Delivery, TransportError};

#[derive(Debug, Default)]
struct QueueState {
    declared: bool,
    offline: bool,
    next_seq: u64,
    ready: VecDeque<Delivery>,
    in_flight: HashMap<String, Delivery>,
    dead: Vec<DeadLetter>,
    acked: u64,
}

/// Single-process stand-in for the durable audit queue.
///
/// - enqueue requires a prior `declare_queue` (as a broker would)
/// - received messages stay in flight until acked or released
/// - released messages go back to the front, preserving order
/// - `set_offline(true)` makes the producer side fail as if the broker
///   were unreachable; consumers keep draining what is already queued
#[derive(Debug)]
pub struct InMemoryAuditQueue {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl InMemoryAuditQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.offline = offline;
        }
    }

    /// Messages waiting to be delivered.
    pub fn ready_len(&self) -> usize {
        self.state.lock().map(|s| s.ready.len()).unwrap_or(0)
    }

    /// Messages delivered but not yet acked or released.
    pub fn in_flight_len(&self) -> usize {
        self.state.lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    pub fn acked_total(&self) -> u64 {
        self.state.lock().map(|s| s.acked).unwrap_or(0)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().map(|s| s.dead.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, QueueState>, TransportError> {
        self.state
            .lock()
            .map_err(|_| TransportError::Unavailable("in-memory queue lock poisoned".to_string()))
    }

    fn take_ready(&self, max: usize) -> Result<Vec<Delivery>, TransportError> {
        let mut state = self.lock()?;
        let n = max.min(state.ready.len());
        let batch: Vec<Delivery> = state.ready.drain(..n).collect();
        for d in &batch {
            state.in_flight.insert(d.id.clone(), d.clone());
        }
        Ok(batch)
    }
}

impl Default for InMemoryAuditQueue {
    fn default() -> Self {
        Self::new("audit_queue")
    }
}

#[async_trait]
impl AuditTransport for InMemoryAuditQueue {
    async fn declare_queue(&self) -> Result<(), TransportError> {
        let mut state = self.lock()?;
        if state.offline {
            return Err(TransportError::Unavailable(format!("queue '{}' unreachable", self.name)));
        }
        state.declared = true;
        Ok(())
    }

    async fn enqueue(&self, payload: Vec<u8>) -> Result<String, TransportError> {
        let id = {
            let mut state = self.lock()?;
            if state.offline {
                return Err(TransportError::Unavailable(format!("queue '{}' unreachable", self.name)));
            }
            if !state.declared {
                return Err(TransportError::QueueNotDeclared(self.name.clone()));
            }
            state.next_seq += 1;
            let id = format!("{}-{}", self.name, state.next_seq);
            state.ready.push_back(Delivery {
                id: id.clone(),
                payload,
            });
            id
        };
        self.notify.notify_one();
        Ok(id)
    }
}

#[async_trait]
impl AuditSource for InMemoryAuditQueue {
    async fn subscribe(&self) -> Result<(), TransportError> {
        self.lock()?.declared = true;
        Ok(())
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>, TransportError> {
        let batch = self.take_ready(max)?;
        if !batch.is_empty() || max == 0 {
            return Ok(batch);
        }

        // `notify_one` stores a permit, so an enqueue between the check above
        // and this await is not lost.
        if tokio::time::timeout(wait, self.notify.notified()).await.is_err() {
            return Ok(Vec::new());
        }
        self.take_ready(max)
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), TransportError> {
        let mut state = self.lock()?;
        state
            .in_flight
            .remove(delivery_id)
            .ok_or_else(|| TransportError::UnknownDelivery(delivery_id.to_string()))?;
        state.acked += 1;
        Ok(())
    }

    async fn release(&self, delivery_id: &str) -> Result<(), TransportError> {
        {
            let mut state = self.lock()?;
            let delivery = state
                .in_flight
                .remove(delivery_id)
                .ok_or_else(|| TransportError::UnknownDelivery(delivery_id.to_string()))?;
            state.ready.push_front(delivery);
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), TransportError> {
        self.lock()?.dead.push(DeadLetter {
            original_id: delivery.id.clone(),
            payload: delivery.payload.clone(),
            reason: reason.to_string(),
            failed_at: Utc::now(),
        });
        tracing::warn!(
            queue = %self.name,
            delivery_id = %delivery.id,
            reason,
            "audit message dead-lettered"
        );
        Ok(())
    }
}
