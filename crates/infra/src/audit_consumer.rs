//! Long-lived audit consumer: queue → decode → sink.
//!
//! One tokio task per process, processing deliveries sequentially so a single
//! consumer preserves queue order. Two delivery modes:
//!
//! - [`AckMode::AfterWrite`] (default): ack only once the sink write
//!   succeeded. A failed write is released for redelivery after a short
//!   backoff; after `max_attempts` failures the message is dead-lettered and
//!   acked. At-least-once.
//! - [`AckMode::OnReceive`]: ack as soon as a message is received; sink
//!   failures are logged and the event is dropped. At-most-once.
//!
//! Malformed messages are logged, dead-lettered and acked in both modes; they
//! never stop the loop or block later messages.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tenantnotes_events::{AuditEvent, AuditSource, Delivery};

use crate::audit_sink::AuditSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    #[default]
    AfterWrite,
    OnReceive,
}

impl FromStr for AckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "after_write" | "at_least_once" => Ok(Self::AfterWrite),
            "on_receive" | "auto" | "at_most_once" => Ok(Self::OnReceive),
            other => Err(format!("unknown ack mode '{other}' (expected after_write or on_receive)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditConsumerConfig {
    pub ack_mode: AckMode,
    /// Sink attempts per message before dead-lettering (`AfterWrite` only).
    pub max_attempts: u32,
    pub batch_size: usize,
    /// How long one receive call may wait for new messages.
    pub poll_wait: Duration,
    /// Delay before a failed write is released for redelivery.
    pub retry_backoff: Duration,
    /// Delay after a transport error before trying again.
    pub error_backoff: Duration,
}

impl Default for AuditConsumerConfig {
    fn default() -> Self {
        Self {
            ack_mode: AckMode::AfterWrite,
            max_attempts: 5,
            batch_size: 16,
            poll_wait: Duration::from_millis(500),
            retry_backoff: Duration::from_millis(200),
            error_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub written: u64,
    pub decode_failures: u64,
    pub write_failures: u64,
    pub redelivered: u64,
    pub dead_lettered: u64,
    pub dropped: u64,
}

/// Handle to observe and stop a running consumer.
#[derive(Debug)]
pub struct AuditConsumerHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl AuditConsumerHandle {
    pub fn stats(&self) -> ConsumerStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    /// Request a graceful stop and wait for the loop to finish its current
    /// message. Unacknowledged messages stay queued for the next start.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            if let Err(err) = join.await {
                warn!(error = %err, "audit consumer task ended abnormally");
            }
        }
    }
}

pub struct AuditConsumer;

impl AuditConsumer {
    /// Spawn the consumer loop on the current tokio runtime.
    pub fn spawn<Q, S>(source: Q, sink: S, config: AuditConsumerConfig) -> AuditConsumerHandle
    where
        Q: AuditSource + 'static,
        S: AuditSink + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(ConsumerStats::default()));

        let worker = Worker {
            source,
            sink,
            config,
            stats: stats.clone(),
            attempts: HashMap::new(),
        };
        let join = tokio::spawn(worker.run(shutdown_rx));

        AuditConsumerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

struct Worker<Q, S> {
    source: Q,
    sink: S,
    config: AuditConsumerConfig,
    stats: Arc<Mutex<ConsumerStats>>,
    attempts: HashMap<String, u32>,
}

impl<Q, S> Worker<Q, S>
where
    Q: AuditSource,
    S: AuditSink,
{
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            match self.source.subscribe().await {
                Ok(()) => break,
                Err(err) => {
                    warn!(error = %err, "audit consumer cannot subscribe; retrying");
                    if sleep_or_shutdown(self.config.error_backoff, &mut shutdown).await {
                        return;
                    }
                }
            }
        }
        info!(ack_mode = ?self.config.ack_mode, "audit consumer started");

        loop {
            let received = tokio::select! {
                _ = shutdown.changed() => break,
                r = self.source.receive(self.config.batch_size, self.config.poll_wait) => r,
            };

            let batch = match received {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(error = %err, "audit consumer receive failed");
                    if sleep_or_shutdown(self.config.error_backoff, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            let mut batch = batch.into_iter();
            while let Some(delivery) = batch.next() {
                self.process(delivery).await;
                if *shutdown.borrow() {
                    self.release_unprocessed(batch).await;
                    info!("audit consumer stopped");
                    return;
                }
            }
        }

        info!("audit consumer stopped");
    }

    fn bump(&self, f: impl FnOnce(&mut ConsumerStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    async fn ack(&self, delivery: &Delivery) {
        if let Err(err) = self.source.ack(&delivery.id).await {
            warn!(delivery_id = %delivery.id, error = %err, "audit ack failed");
        }
    }

    async fn dead_letter(&mut self, delivery: &Delivery, reason: &str) {
        if let Err(err) = self.source.dead_letter(delivery, reason).await {
            warn!(delivery_id = %delivery.id, error = %err, "audit dead-letter failed");
        }
        self.attempts.remove(&delivery.id);
        self.bump(|s| s.dead_lettered += 1);
    }

    async fn process(&mut self, delivery: Delivery) {
        self.bump(|s| s.received += 1);
        let after_write = self.config.ack_mode == AckMode::AfterWrite;

        if !after_write {
            self.ack(&delivery).await;
        }

        let event = match AuditEvent::decode(&delivery.payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(delivery_id = %delivery.id, error = %err, "malformed audit message skipped");
                self.bump(|s| s.decode_failures += 1);
                self.dead_letter(&delivery, &format!("decode failed: {err}")).await;
                if after_write {
                    self.ack(&delivery).await;
                }
                return;
            }
        };

        match self.sink.write(&event).await {
            Ok(()) => {
                self.bump(|s| s.written += 1);
                self.attempts.remove(&delivery.id);
                if after_write {
                    self.ack(&delivery).await;
                }
                debug!(
                    delivery_id = %delivery.id,
                    event_id = %event.event_id(),
                    organization_id = %event.organization_id(),
                    note_id = %event.note_id(),
                    "audit event persisted"
                );
            }
            Err(err) if !after_write => {
                self.bump(|s| {
                    s.write_failures += 1;
                    s.dropped += 1;
                });
                warn!(
                    delivery_id = %delivery.id,
                    event_id = %event.event_id(),
                    error = %err,
                    "audit write failed; event dropped (auto-ack mode)"
                );
            }
            Err(err) => {
                self.bump(|s| s.write_failures += 1);
                let attempt = {
                    let n = self.attempts.entry(delivery.id.clone()).or_insert(0);
                    *n += 1;
                    *n
                };

                if attempt >= self.config.max_attempts {
                    warn!(
                        delivery_id = %delivery.id,
                        event_id = %event.event_id(),
                        attempt,
                        error = %err,
                        "audit write failed; giving up"
                    );
                    self.dead_letter(&delivery, &format!("sink write failed {attempt} times: {err}"))
                        .await;
                    self.ack(&delivery).await;
                } else {
                    warn!(
                        delivery_id = %delivery.id,
                        event_id = %event.event_id(),
                        attempt,
                        error = %err,
                        "audit write failed; will redeliver"
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                    match self.source.release(&delivery.id).await {
                        Ok(()) => self.bump(|s| s.redelivered += 1),
                        Err(e) => warn!(delivery_id = %delivery.id, error = %e, "audit release failed"),
                    }
                }
            }
        }
    }

    async fn release_unprocessed(&self, rest: impl Iterator<Item = Delivery>) {
        if self.config.ack_mode != AckMode::AfterWrite {
            return;
        }
        for delivery in rest {
            if let Err(err) = self.source.release(&delivery.id).await {
                warn!(delivery_id = %delivery.id, error = %err, "audit release failed");
            }
        }
    }
}

/// Sleep for `d`; returns `true` if shutdown was requested meanwhile.
async fn sleep_or_shutdown(d: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(d) => *shutdown.borrow(),
        _ = shutdown.changed() => true,
    }
}
