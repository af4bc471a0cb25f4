//! Audit sink: append-only persistence of audit events.
//!
//! The sink is the last hop of the audit pipeline. It never updates or
//! deletes; a redelivered event is simply written again and stays
//! identifiable through its `event_id`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use tenantnotes_events::AuditEvent;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryAuditSink;
pub use postgres::PostgresAuditSink;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkWriteError {
    #[error("audit write timed out after {0:?}")]
    Timeout(Duration),

    #[error("audit store error: {0}")]
    Store(String),
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, event: &AuditEvent) -> Result<(), SinkWriteError>;
}

#[async_trait]
impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    async fn write(&self, event: &AuditEvent) -> Result<(), SinkWriteError> {
        (**self).write(event).await
    }
}

/// `true` for names safe to splice into SQL as a table identifier.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_validation() {
        assert!(is_sql_identifier("activity_logs"));
        assert!(is_sql_identifier("_x1"));
        assert!(!is_sql_identifier(""));
        assert!(!is_sql_identifier("1logs"));
        assert!(!is_sql_identifier("logs;drop"));
        assert!(!is_sql_identifier("a\"b"));
        assert!(!is_sql_identifier(&"a".repeat(64)));
    }
}
