//! Redis Streams-backed audit queue (durable, at-least-once delivery).
//!
//! - **Stream key**: the configured queue name (e.g. `audit_queue`)
//! - **Consumer group**: one per writer role (e.g. `audit.writer`), created
//!   with `MKSTREAM` from id `0` so entries added before the first consumer
//!   starts are not skipped
//! - **Consumer**: a stable name, so a restarted writer re-reads its own
//!   pending entries
//! - **Dead-letter stream**: `<queue>:dlq`
//!
//! Entries delivered but not acknowledged stay in the group's pending list.
//! After a restart or a `release`, the next read replays that list (`ID 0`)
//! before asking for new entries (`ID >`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Value;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use tenantnotes_events::{AuditSource, AuditTransport, Delivery, TransportError};

const PAYLOAD_FIELD: &str = "payload";

pub struct RedisStreamsAuditQueue {
    client: redis::Client,
    stream_key: String,
    dlq_key: String,
    group: String,
    consumer: String,
    commands: Mutex<Option<MultiplexedConnection>>,
    // Blocking reads get their own connection so they never delay producers.
    reads: Mutex<Option<MultiplexedConnection>>,
    replay_pending: AtomicBool,
}

impl RedisStreamsAuditQueue {
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g. "redis://localhost:6379")
    /// * `stream_key` - queue name; the dead-letter stream is `<stream_key>:dlq`
    /// * `group` / `consumer` - consumer group and stable consumer name
    pub fn new(
        redis_url: &str,
        stream_key: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let client = redis::Client::open(redis_url).map_err(|e| TransportError::Unavailable(e.to_string()))?;
        let stream_key = stream_key.into();

        Ok(Self {
            client,
            dlq_key: format!("{stream_key}:dlq"),
            stream_key,
            group: group.into(),
            consumer: consumer.into(),
            commands: Mutex::new(None),
            reads: Mutex::new(None),
            replay_pending: AtomicBool::new(true),
        })
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    async fn connection(
        &self,
        slot: &Mutex<Option<MultiplexedConnection>>,
    ) -> Result<MultiplexedConnection, TransportError> {
        let mut guard = slot.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Drop a cached connection after an IO-level failure.
    async fn reset_on_io_error(&self, slot: &Mutex<Option<MultiplexedConnection>>, err: &redis::RedisError) {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            *slot.lock().await = None;
        }
    }

    async fn command<T: redis::FromRedisValue>(&self, cmd: redis::Cmd, what: &str) -> Result<T, TransportError> {
        let mut conn = self.connection(&self.commands).await?;
        match cmd.query_async::<_, T>(&mut conn).await {
            Ok(v) => Ok(v),
            Err(e) => {
                self.reset_on_io_error(&self.commands, &e).await;
                Err(map_redis_error(what, e))
            }
        }
    }

    /// XGROUP CREATE ... MKSTREAM; an existing group is not an error.
    async fn ensure_group(&self) -> Result<(), TransportError> {
        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE").arg(&self.stream_key).arg(&self.group).arg("0").arg("MKSTREAM");

        match self.command::<()>(cmd, "XGROUP CREATE").await {
            Ok(()) => Ok(()),
            Err(TransportError::Command(msg)) if msg.contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn read_group(&self, start_id: &str, max: usize, block: Option<Duration>) -> Result<Vec<Delivery>, TransportError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(&self.group).arg(&self.consumer).arg("COUNT").arg(max);
        if let Some(block) = block {
            cmd.arg("BLOCK").arg(block.as_millis().max(1) as u64);
        }
        cmd.arg("STREAMS").arg(&self.stream_key).arg(start_id);

        let mut conn = self.connection(&self.reads).await?;
        match cmd.query_async::<_, Value>(&mut conn).await {
            Ok(reply) => parse_read_reply(reply),
            Err(e) => {
                self.reset_on_io_error(&self.reads, &e).await;
                Err(map_redis_error("XREADGROUP", e))
            }
        }
    }
}

impl core::fmt::Debug for RedisStreamsAuditQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisStreamsAuditQueue")
            .field("stream_key", &self.stream_key)
            .field("group", &self.group)
            .field("consumer", &self.consumer)
            .finish()
    }
}

fn map_redis_error(what: &str, err: redis::RedisError) -> TransportError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
        TransportError::Unavailable(format!("{what}: {err}"))
    } else {
        TransportError::Command(format!("{what}: {err}"))
    }
}

fn bytes_of(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Data(d) => Some(d.clone()),
        Value::Status(s) => Some(s.as_bytes().to_vec()),
        _ => None,
    }
}

/// Parse an XREADGROUP reply.
///
/// Shape: `[[stream, [[id, [field, value, ...]], ...]], ...]`, or nil when a
/// blocking read timed out. A pending entry whose data was trimmed comes back
/// with nil fields; it is delivered with an empty payload so the consumer
/// dead-letters it.
fn parse_read_reply(reply: Value) -> Result<Vec<Delivery>, TransportError> {
    let streams = match reply {
        Value::Nil => return Ok(Vec::new()),
        Value::Bulk(streams) => streams,
        other => return Err(TransportError::Command(format!("unexpected XREADGROUP reply: {other:?}"))),
    };

    let mut deliveries = Vec::new();
    for stream in streams {
        let Value::Bulk(mut parts) = stream else {
            continue;
        };
        if parts.len() < 2 {
            continue;
        }
        let Value::Bulk(entries) = parts.swap_remove(1) else {
            continue;
        };

        for entry in entries {
            let Value::Bulk(entry) = entry else {
                continue;
            };
            let Some(id) = entry.first().and_then(bytes_of) else {
                continue;
            };
            let id = String::from_utf8_lossy(&id).into_owned();

            let payload = match entry.get(1) {
                Some(Value::Bulk(fields)) => fields
                    .chunks(2)
                    .find(|kv| kv.len() == 2 && bytes_of(&kv[0]).as_deref() == Some(PAYLOAD_FIELD.as_bytes()))
                    .and_then(|kv| bytes_of(&kv[1]))
                    .unwrap_or_default(),
                _ => Vec::new(),
            };

            deliveries.push(Delivery { id, payload });
        }
    }

    Ok(deliveries)
}

#[async_trait]
impl AuditTransport for RedisStreamsAuditQueue {
    async fn declare_queue(&self) -> Result<(), TransportError> {
        self.ensure_group().await
    }

    #[instrument(skip_all, fields(stream_key = %self.stream_key), err)]
    async fn enqueue(&self, payload: Vec<u8>) -> Result<String, TransportError> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream_key).arg("*").arg(PAYLOAD_FIELD).arg(payload);
        self.command::<String>(cmd, "XADD").await
    }
}

#[async_trait]
impl AuditSource for RedisStreamsAuditQueue {
    async fn subscribe(&self) -> Result<(), TransportError> {
        self.ensure_group().await?;
        self.replay_pending.store(true, Ordering::Release);
        Ok(())
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>, TransportError> {
        if self.replay_pending.load(Ordering::Acquire) {
            let pending = self.read_group("0", max, None).await?;
            if !pending.is_empty() {
                return Ok(pending);
            }
            self.replay_pending.store(false, Ordering::Release);
        }

        self.read_group(">", max, Some(wait)).await
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), TransportError> {
        let mut cmd = redis::cmd("XACK");
        cmd.arg(&self.stream_key).arg(&self.group).arg(delivery_id);
        let acked: u64 = self.command(cmd, "XACK").await?;
        if acked == 0 {
            return Err(TransportError::UnknownDelivery(delivery_id.to_string()));
        }
        Ok(())
    }

    async fn release(&self, _delivery_id: &str) -> Result<(), TransportError> {
        // The entry is still in our pending list; replay it on the next read.
        self.replay_pending.store(true, Ordering::Release);
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), TransportError> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.dlq_key)
            .arg("*")
            .arg("original_message_id")
            .arg(&delivery.id)
            .arg("reason")
            .arg(reason)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .arg(PAYLOAD_FIELD)
            .arg(delivery.payload.as_slice());
        let _: String = self.command(cmd, "DLQ XADD").await?;

        warn!(
            delivery_id = %delivery.id,
            dlq = %self.dlq_key,
            reason,
            "audit message sent to dead-letter stream"
        );
        Ok(())
    }
}
