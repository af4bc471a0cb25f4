use std::sync::Mutex;

use async_trait::async_trait;

use tenantnotes_core::OrganizationId;
use tenantnotes_events::AuditEvent;

use super::{AuditSink, SinkWriteError};

/// In-memory append-only audit log for tests/dev.
///
/// `fail_next(n)` makes the next `n` writes fail with a store error, which
/// is how tests exercise the consumer's redelivery path.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    inner: Mutex<SinkState>,
}

#[derive(Debug, Default)]
struct SinkState {
    records: Vec<AuditEvent>,
    failures_remaining: u32,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, writes: u32) {
        if let Ok(mut state) = self.inner.lock() {
            state.failures_remaining = writes;
        }
    }

    /// All records in write order (duplicates included).
    pub fn records(&self) -> Vec<AuditEvent> {
        self.inner.lock().map(|s| s.records.clone()).unwrap_or_default()
    }

    pub fn records_for(&self, organization_id: &OrganizationId) -> Vec<AuditEvent> {
        self.records()
            .into_iter()
            .filter(|e| e.organization_id() == organization_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn write(&self, event: &AuditEvent) -> Result<(), SinkWriteError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| SinkWriteError::Store("in-memory sink lock poisoned".to_string()))?;

        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(SinkWriteError::Store("injected failure".to_string()));
        }

        state.records.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tenantnotes_core::{NoteId, UserId};

    fn event(org: &str) -> AuditEvent {
        AuditEvent::note_created(
            NoteId::new(1),
            OrganizationId::new(org).unwrap(),
            UserId::new("u1").unwrap(),
            "t",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn duplicates_are_appended_not_merged() {
        let sink = InMemoryAuditSink::new();
        let e = event("orgA");
        sink.write(&e).await.unwrap();
        sink.write(&e).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert!(sink.records().iter().all(|r| r.event_id() == e.event_id()));
    }

    #[tokio::test]
    async fn records_are_filterable_by_organization() {
        let sink = InMemoryAuditSink::new();
        sink.write(&event("orgA")).await.unwrap();
        sink.write(&event("orgB")).await.unwrap();

        let org_a = OrganizationId::new("orgA").unwrap();
        assert_eq!(sink.records_for(&org_a).len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let sink = InMemoryAuditSink::new();
        sink.fail_next(1);
        assert!(sink.write(&event("orgA")).await.is_err());
        assert!(sink.write(&event("orgA")).await.is_ok());
        assert_eq!(sink.len(), 1);
    }
}
