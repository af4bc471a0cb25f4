//! Schema bootstrap for the primary and audit stores.

use sqlx::PgPool;

use crate::audit_sink::is_sql_identifier;

const NOTES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS notes (
    id BIGSERIAL PRIMARY KEY,
    title VARCHAR(255) NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    organization_id VARCHAR(50) NOT NULL,
    user_id VARCHAR(50) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_notes_org ON notes(organization_id);
"#;

/// Create the `notes` table and its tenant index (idempotent).
pub async fn migrate_notes(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::raw_sql(NOTES_SCHEMA).execute(pool).await?;
    Ok(())
}

/// Create the audit collection table (idempotent).
pub async fn migrate_audit(pool: &PgPool, table: &str) -> anyhow::Result<()> {
    anyhow::ensure!(is_sql_identifier(table), "invalid audit table name '{table}'");

    let ddl = format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id BIGSERIAL PRIMARY KEY,
    event_id UUID NOT NULL,
    organization_id VARCHAR(50) NOT NULL,
    user_id VARCHAR(50) NOT NULL,
    action VARCHAR(64) NOT NULL,
    note_id BIGINT NOT NULL,
    document JSONB NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_{table}_org ON {table}(organization_id);
CREATE INDEX IF NOT EXISTS idx_{table}_event ON {table}(event_id);
"#
    );

    sqlx::raw_sql(&ddl).execute(pool).await?;
    Ok(())
}
