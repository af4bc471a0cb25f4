//! Audit channel contract (mechanics only).
//!
//! The channel is split into two sides so the request path and the audit
//! writer never share more than a queue name:
//!
//! ```text
//! NoteService → AuditProducer → AuditTransport ══ durable queue ══ AuditSource → AuditConsumer → AuditSink
//! ```
//!
//! ## Delivery guarantees
//!
//! - Messages stay in the queue until acknowledged; a released or never-acked
//!   delivery is handed out again (at-least-once).
//! - Consumers must tolerate duplicates. Audit events carry an `event_id` so
//!   duplicates are identifiable downstream.
//! - A single consumer sees messages in enqueue order.
//!
//! Payloads are opaque bytes here; decoding belongs to the consumer so that a
//! malformed message can be dead-lettered instead of wedging the queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// One message handed to a consumer, pending acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Transport-assigned id used for ack/release (e.g. a stream entry id).
    pub id: String,
    pub payload: Vec<u8>,
}

/// A message removed from circulation after it could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub original_id: String,
    pub payload: Vec<u8>,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Broker unreachable or refusing connections.
    #[error("audit transport unavailable: {0}")]
    Unavailable(String),

    /// The queue was not declared before use.
    #[error("audit queue '{0}' has not been declared")]
    QueueNotDeclared(String),

    /// A broker command failed.
    #[error("audit transport command failed: {0}")]
    Command(String),

    /// Ack/release for an id this consumer does not hold.
    #[error("unknown delivery '{0}'")]
    UnknownDelivery(String),
}

/// Producer side of the audit queue.
#[async_trait]
pub trait AuditTransport: Send + Sync {
    /// Declare the durable queue. Idempotent.
    async fn declare_queue(&self) -> Result<(), TransportError>;

    /// Append one payload; returns the transport-assigned message id.
    async fn enqueue(&self, payload: Vec<u8>) -> Result<String, TransportError>;
}

/// Consumer side of the audit queue.
#[async_trait]
pub trait AuditSource: Send + Sync {
    /// Join the queue as a consumer (declaring it if needed). Idempotent.
    async fn subscribe(&self) -> Result<(), TransportError>;

    /// Wait up to `wait` for at most `max` deliveries. An empty batch means
    /// nothing arrived in time.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>, TransportError>;

    /// Remove a delivery from the queue for good.
    async fn ack(&self, delivery_id: &str) -> Result<(), TransportError>;

    /// Give a delivery back so it is handed out again.
    async fn release(&self, delivery_id: &str) -> Result<(), TransportError>;

    /// Park a delivery on the dead-letter queue. Does not ack it.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), TransportError>;
}

#[async_trait]
impl<T> AuditTransport for Arc<T>
where
    T: AuditTransport + ?Sized,
{
    async fn declare_queue(&self) -> Result<(), TransportError> {
        (**self).declare_queue().await
    }

    async fn enqueue(&self, payload: Vec<u8>) -> Result<String, TransportError> {
        (**self).enqueue(payload).await
    }
}

#[async_trait]
impl<S> AuditSource for Arc<S>
where
    S: AuditSource + ?Sized,
{
    async fn subscribe(&self) -> Result<(), TransportError> {
        (**self).subscribe().await
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>, TransportError> {
        (**self).receive(max, wait).await
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), TransportError> {
        (**self).ack(delivery_id).await
    }

    async fn release(&self, delivery_id: &str) -> Result<(), TransportError> {
        (**self).release(delivery_id).await
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), TransportError> {
        (**self).dead_letter(delivery, reason).await
    }
}
