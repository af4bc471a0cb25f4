//! Primary note storage.
//!
//! Every read takes the requesting organization as a mandatory argument and
//! every write carries it inside [`NewNote`]; there is no unscoped query, so
//! cross-tenant access cannot be expressed through this interface.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use tenantnotes_core::{NoteId, OrganizationId};
use tenantnotes_notes::{NewNote, Note};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryNoteStore;
pub use postgres::PostgresNoteStore;

#[derive(Debug, Error)]
pub enum NoteStoreError {
    #[error("note store query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("stored note is invalid: {0}")]
    Corrupt(String),

    #[error("note store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Persist a validated note and return it with its assigned id.
    async fn create(&self, note: NewNote) -> Result<Note, NoteStoreError>;

    /// All notes of one organization, oldest first.
    async fn list(&self, organization_id: &OrganizationId) -> Result<Vec<Note>, NoteStoreError>;

    /// One note, only if it belongs to `organization_id`.
    async fn get(&self, organization_id: &OrganizationId, id: NoteId) -> Result<Option<Note>, NoteStoreError>;
}

#[async_trait]
impl<S> NoteStore for Arc<S>
where
    S: NoteStore + ?Sized,
{
    async fn create(&self, note: NewNote) -> Result<Note, NoteStoreError> {
        (**self).create(note).await
    }

    async fn list(&self, organization_id: &OrganizationId) -> Result<Vec<Note>, NoteStoreError> {
        (**self).list(organization_id).await
    }

    async fn get(&self, organization_id: &OrganizationId, id: NoteId) -> Result<Option<Note>, NoteStoreError> {
        (**self).get(organization_id, id).await
    }
}
