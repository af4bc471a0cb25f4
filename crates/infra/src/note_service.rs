//! Note operations and the hand-off of their audit events.
//!
//! Authorization has already happened by the time these run; what remains is
//! input validation, the tenant-scoped store call and, for writes, handing an
//! audit event to the channel without waiting for it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use tenantnotes_core::{DomainError, NoteId, OrganizationId, UserId};
use tenantnotes_events::AuditEvent;
use tenantnotes_notes::{NewNote, Note};

use crate::audit_channel::AuditProducer;
use crate::notes::{NoteStore, NoteStoreError};

#[derive(Debug, Error)]
pub enum NoteServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("note not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] NoteStoreError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandoffStats {
    pub dispatched: u64,
    pub published: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct HandoffCounters {
    dispatched: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
}

/// Fire-and-forget delivery of audit events to the producer.
///
/// Each event is published from its own spawned task so the caller never
/// waits on the transport. Tasks are tracked in a `JoinSet`: finished ones
/// are reaped on every dispatch, the rest are joined by [`drain`](Self::drain)
/// at shutdown.
pub struct AuditHandoff {
    producer: Arc<AuditProducer>,
    tasks: Mutex<JoinSet<()>>,
    counters: Arc<HandoffCounters>,
}

impl AuditHandoff {
    pub fn new(producer: Arc<AuditProducer>) -> Self {
        Self {
            producer,
            tasks: Mutex::new(JoinSet::new()),
            counters: Arc::new(HandoffCounters::default()),
        }
    }

    /// Start publishing `event` in the background. Must be called from
    /// within a tokio runtime.
    pub fn dispatch(&self, event: AuditEvent) {
        let producer = self.producer.clone();
        let counters = self.counters.clone();
        counters.dispatched.fetch_add(1, Ordering::Relaxed);

        let Ok(mut tasks) = self.tasks.lock() else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!(event_id = %event.event_id(), "audit hand-off unavailable; event dropped");
            return;
        };

        while let Some(finished) = tasks.try_join_next() {
            if let Err(err) = finished {
                warn!(error = %err, "audit publish task ended abnormally");
            }
        }

        tasks.spawn(async move {
            match producer.publish(&event).await {
                Ok(()) => {
                    counters.published.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        event_id = %event.event_id(),
                        action = %event.action(),
                        organization_id = %event.organization_id(),
                        note_id = %event.note_id(),
                        error = %err,
                        "audit event not delivered; primary write unaffected"
                    );
                }
            }
        });
    }

    /// Publishes still running.
    pub fn pending(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> HandoffStats {
        HandoffStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            published: self.counters.published.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Wait up to `grace` for outstanding publishes; abort whatever is left.
    /// Returns the number of aborted publishes.
    pub async fn drain(&self, grace: Duration) -> usize {
        let mut tasks = match self.tasks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return 0,
        };

        let joined = tokio::time::timeout(grace, async {
            while let Some(finished) = tasks.join_next().await {
                if let Err(err) = finished {
                    warn!(error = %err, "audit publish task ended abnormally");
                }
            }
        })
        .await;

        let aborted = tasks.len();
        if joined.is_err() {
            warn!(aborted, "audit hand-off drain timed out");
            tasks.abort_all();
        } else {
            info!("audit hand-off drained");
        }
        aborted
    }
}

impl core::fmt::Debug for AuditHandoff {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuditHandoff")
            .field("pending", &self.pending())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Tenant-scoped note operations.
#[derive(Clone)]
pub struct NoteService {
    store: Arc<dyn NoteStore>,
    audit: Arc<AuditHandoff>,
}

impl NoteService {
    pub fn new(store: Arc<dyn NoteStore>, audit: Arc<AuditHandoff>) -> Self {
        Self { store, audit }
    }

    pub fn audit(&self) -> &Arc<AuditHandoff> {
        &self.audit
    }

    /// Validate, persist, then hand off a `CREATE_NOTE` audit event.
    ///
    /// The event is built from the persisted note and the caller's bound
    /// identity only. Its delivery outcome never changes the result.
    pub async fn create_note(
        &self,
        organization_id: &OrganizationId,
        user_id: &UserId,
        title: &str,
        content: &str,
    ) -> Result<Note, NoteServiceError> {
        let new_note = NewNote::new(title, content, organization_id.clone(), user_id.clone())?;
        let note = self.store.create(new_note).await?;

        debug!(
            organization_id = %note.organization_id,
            user_id = %note.owner_user_id,
            note_id = %note.id,
            "note created"
        );

        self.audit.dispatch(AuditEvent::note_created(
            note.id,
            note.organization_id.clone(),
            note.owner_user_id.clone(),
            &note.title,
            Utc::now(),
        ));

        Ok(note)
    }

    pub async fn list_notes(&self, organization_id: &OrganizationId) -> Result<Vec<Note>, NoteServiceError> {
        Ok(self.store.list(organization_id).await?)
    }

    /// A note of another organization is reported exactly like a missing one.
    pub async fn get_note(&self, organization_id: &OrganizationId, id: NoteId) -> Result<Note, NoteServiceError> {
        self.store
            .get(organization_id, id)
            .await?
            .ok_or(NoteServiceError::NotFound)
    }
}

impl core::fmt::Debug for NoteService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NoteService").field("audit", &self.audit).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tenantnotes_events::{AuditAction, AuditSource, AuditTransport, InMemoryAuditQueue, TransportError};

    use crate::notes::InMemoryNoteStore;

    fn ids(org: &str) -> (OrganizationId, UserId) {
        (OrganizationId::new(org).unwrap(), UserId::new("u1").unwrap())
    }

    fn service_over(transport: Arc<dyn AuditTransport>, timeout: Duration) -> NoteService {
        let producer = Arc::new(AuditProducer::new(transport, timeout));
        NoteService::new(Arc::new(InMemoryNoteStore::new()), Arc::new(AuditHandoff::new(producer)))
    }

    struct Stalled;

    #[async_trait]
    impl AuditTransport for Stalled {
        async fn declare_queue(&self) -> Result<(), TransportError> {
            std::future::pending().await
        }

        async fn enqueue(&self, _payload: Vec<u8>) -> Result<String, TransportError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn create_publishes_a_trusted_audit_event() {
        let queue = Arc::new(InMemoryAuditQueue::default());
        let service = service_over(queue.clone(), Duration::from_secs(5));
        let (org, user) = ids("orgA");

        let note = service.create_note(&org, &user, "  hi  ", "body").await.unwrap();
        assert_eq!(note.title, "hi");
        assert_eq!(note.organization_id, org);

        service.audit().drain(Duration::from_secs(1)).await;
        let delivered = queue.receive(1, Duration::from_millis(10)).await.unwrap();
        let event = AuditEvent::decode(&delivered[0].payload).unwrap();
        assert_eq!(event.action(), AuditAction::CreateNote);
        assert_eq!(event.note_id(), note.id);
        assert_eq!(event.organization_id(), &org);
        assert_eq!(event.user_id(), &user);
        assert_eq!(event.details(), "Note created with title: hi");
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_without_audit() {
        let queue = Arc::new(InMemoryAuditQueue::default());
        let service = service_over(queue.clone(), Duration::from_secs(5));
        let (org, user) = ids("orgA");

        let err = service.create_note(&org, &user, "   ", "").await.unwrap_err();
        assert!(matches!(err, NoteServiceError::Domain(DomainError::Validation(_))));
        assert_eq!(service.audit().stats().dispatched, 0);
    }

    #[tokio::test]
    async fn transport_outage_does_not_fail_the_write() {
        let queue = Arc::new(InMemoryAuditQueue::default());
        queue.set_offline(true);
        let service = service_over(queue.clone(), Duration::from_secs(5));
        let (org, user) = ids("orgA");

        let note = service.create_note(&org, &user, "kept", "").await.unwrap();
        service.audit().drain(Duration::from_secs(1)).await;

        assert_eq!(service.get_note(&org, note.id).await.unwrap(), note);
        assert_eq!(service.audit().stats().failed, 1);
        assert_eq!(queue.ready_len(), 0);
    }

    #[tokio::test]
    async fn stalled_transport_does_not_delay_the_caller() {
        let service = service_over(Arc::new(Stalled), Duration::from_millis(50));
        let (org, user) = ids("orgA");

        let started = std::time::Instant::now();
        service.create_note(&org, &user, "fast", "").await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(service.audit().pending(), 1);

        service.audit().drain(Duration::from_secs(1)).await;
        assert_eq!(service.audit().stats().failed, 1);
    }

    #[tokio::test]
    async fn drain_aborts_after_grace() {
        let service = service_over(Arc::new(Stalled), Duration::from_secs(60));
        let (org, user) = ids("orgA");
        service.create_note(&org, &user, "slow", "").await.unwrap();

        let aborted = service.audit().drain(Duration::from_millis(20)).await;
        assert_eq!(aborted, 1);
    }

    #[tokio::test]
    async fn reads_are_tenant_scoped() {
        let service = service_over(Arc::new(InMemoryAuditQueue::default()), Duration::from_secs(5));
        let (org_a, user) = ids("orgA");
        let (org_b, _) = ids("orgB");

        let b_note = service.create_note(&org_b, &user, "b", "").await.unwrap();
        assert!(matches!(service.get_note(&org_a, b_note.id).await, Err(NoteServiceError::NotFound)));
        assert!(service.list_notes(&org_a).await.unwrap().is_empty());
        assert_eq!(service.list_notes(&org_b).await.unwrap().len(), 1);
    }
}
