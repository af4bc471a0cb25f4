//! Postgres-backed audit sink.
//!
//! Each event is stored as a JSONB document in a collection table, with the
//! tenant and lookup keys lifted into indexed columns. The table name is
//! configurable and validated as a plain identifier before use.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::instrument;

use tenantnotes_events::AuditEvent;

use super::{AuditSink, SinkWriteError, is_sql_identifier};

pub struct PostgresAuditSink {
    pool: PgPool,
    insert_sql: String,
    write_timeout: Duration,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool, table: &str, write_timeout: Duration) -> Result<Self, SinkWriteError> {
        if !is_sql_identifier(table) {
            return Err(SinkWriteError::Store(format!("invalid audit table name '{table}'")));
        }

        Ok(Self {
            pool,
            insert_sql: format!(
                "INSERT INTO {table} (event_id, organization_id, user_id, action, note_id, document) \
                 VALUES ($1, $2, $3, $4, $5, $6)"
            ),
            write_timeout,
        })
    }
}

impl core::fmt::Debug for PostgresAuditSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostgresAuditSink")
            .field("insert_sql", &self.insert_sql)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    #[instrument(
        skip_all,
        fields(
            event_id = %event.event_id(),
            organization_id = %event.organization_id(),
            note_id = %event.note_id()
        ),
        err
    )]
    async fn write(&self, event: &AuditEvent) -> Result<(), SinkWriteError> {
        let document = serde_json::to_value(event).map_err(|e| SinkWriteError::Store(e.to_string()))?;

        let insert = sqlx::query(&self.insert_sql)
            .bind(event.event_id())
            .bind(event.organization_id().as_str())
            .bind(event.user_id().as_str())
            .bind(event.action().as_str())
            .bind(event.note_id().get())
            .bind(Json(document))
            .execute(&self.pool);

        match tokio::time::timeout(self.write_timeout, insert).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SinkWriteError::Store(e.to_string())),
            Err(_) => Err(SinkWriteError::Timeout(self.write_timeout)),
        }
    }
}
