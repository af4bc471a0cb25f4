//! Producer side of the audit channel, plus infrastructure-backed transports.
//!
//! The channel contract lives in `tenantnotes-events` as pure mechanics; this
//! module adds the bounded-time producer and the Redis Streams transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use tenantnotes_events::{AuditEvent, AuditTransport, TransportError};

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsAuditQueue;

/// Default bound on a single publish (declare + enqueue).
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("audit event could not be serialized: {0}")]
    Serialization(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("audit publish timed out after {0:?}")]
    Timeout(Duration),
}

/// Publishes audit events onto the durable queue within a bounded time.
///
/// The queue is declared lazily on first use and again after any failure,
/// so a broker restart (which may lose the declaration) heals on the next
/// publish.
pub struct AuditProducer {
    transport: Arc<dyn AuditTransport>,
    timeout: Duration,
    declared: AtomicBool,
}

impl AuditProducer {
    pub fn new(transport: Arc<dyn AuditTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            declared: AtomicBool::new(false),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Serialize and enqueue one event.
    pub async fn publish(&self, event: &AuditEvent) -> Result<(), PublishError> {
        let payload = event.encode().map_err(|e| PublishError::Serialization(e.to_string()))?;

        match tokio::time::timeout(self.timeout, self.declare_and_enqueue(payload)).await {
            Ok(Ok(message_id)) => {
                debug!(
                    event_id = %event.event_id(),
                    message_id = %message_id,
                    "audit event enqueued"
                );
                Ok(())
            }
            Ok(Err(err)) => {
                self.declared.store(false, Ordering::Release);
                Err(PublishError::Transport(err))
            }
            Err(_) => {
                self.declared.store(false, Ordering::Release);
                Err(PublishError::Timeout(self.timeout))
            }
        }
    }

    async fn declare_and_enqueue(&self, payload: Vec<u8>) -> Result<String, TransportError> {
        if !self.declared.load(Ordering::Acquire) {
            self.transport.declare_queue().await?;
            self.declared.store(true, Ordering::Release);
        }

        match self.transport.enqueue(payload.clone()).await {
            Err(TransportError::QueueNotDeclared(_)) => {
                self.transport.declare_queue().await?;
                self.transport.enqueue(payload).await
            }
            other => other,
        }
    }
}

impl core::fmt::Debug for AuditProducer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuditProducer")
            .field("timeout", &self.timeout)
            .field("declared", &self.declared.load(Ordering::Relaxed))
            .finish()
    }
}
