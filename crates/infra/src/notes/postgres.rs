//! Postgres-backed note store.
//!
//! Every statement filters on `organization_id`; the tenant comes from the
//! caller's verified identity, never from the row being asked for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use tenantnotes_core::{NoteId, OrganizationId, UserId};
use tenantnotes_notes::{NewNote, Note};

use super::{NoteStore, NoteStoreError};

#[derive(Debug, Clone)]
pub struct PostgresNoteStore {
    pool: PgPool,
}

impl PostgresNoteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn note_from_row(row: &PgRow) -> Result<Note, NoteStoreError> {
    let organization_id: String = row.try_get("organization_id")?;
    let user_id: String = row.try_get("user_id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Note {
        id: NoteId::new(row.try_get("id")?),
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        organization_id: OrganizationId::new(organization_id).map_err(|e| NoteStoreError::Corrupt(e.to_string()))?,
        owner_user_id: UserId::new(user_id).map_err(|e| NoteStoreError::Corrupt(e.to_string()))?,
        created_at,
    })
}

#[async_trait]
impl NoteStore for PostgresNoteStore {
    #[instrument(skip_all, fields(organization_id = %note.organization_id()), err)]
    async fn create(&self, note: NewNote) -> Result<Note, NoteStoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO notes (title, content, organization_id, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, content, organization_id, user_id, created_at
            "#,
        )
        .bind(note.title())
        .bind(note.content())
        .bind(note.organization_id().as_str())
        .bind(note.owner_user_id().as_str())
        .fetch_one(&self.pool)
        .await?;

        note_from_row(&row)
    }

    #[instrument(skip_all, fields(organization_id = %organization_id), err)]
    async fn list(&self, organization_id: &OrganizationId) -> Result<Vec<Note>, NoteStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, content, organization_id, user_id, created_at
            FROM notes
            WHERE organization_id = $1
            ORDER BY id
            "#,
        )
        .bind(organization_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(note_from_row).collect()
    }

    #[instrument(skip_all, fields(organization_id = %organization_id, note_id = %id), err)]
    async fn get(&self, organization_id: &OrganizationId, id: NoteId) -> Result<Option<Note>, NoteStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, title, content, organization_id, user_id, created_at
            FROM notes
            WHERE id = $1 AND organization_id = $2
            "#,
        )
        .bind(id.get())
        .bind(organization_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(note_from_row).transpose()
    }
}
