use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use tenantnotes_core::{NoteId, OrganizationId};
use tenantnotes_notes::{NewNote, Note};

use super::{NoteStore, NoteStoreError};

#[derive(Debug, Default)]
struct Notes {
    last_id: i64,
    by_org: HashMap<OrganizationId, BTreeMap<NoteId, Note>>,
}

/// In-memory note store, partitioned by organization.
///
/// Ids come from one global sequence (like a `SERIAL` column), so ids are
/// unique across tenants and a foreign id simply misses the caller's partition.
#[derive(Debug, Default)]
pub struct InMemoryNoteStore {
    inner: RwLock<Notes>,
}

impl InMemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> NoteStoreError {
        NoteStoreError::Unavailable("in-memory note store lock poisoned".to_string())
    }
}

#[async_trait]
impl NoteStore for InMemoryNoteStore {
    async fn create(&self, note: NewNote) -> Result<Note, NoteStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        inner.last_id += 1;
        let id = NoteId::new(inner.last_id);

        let note = note.into_note(id, Utc::now());
        inner
            .by_org
            .entry(note.organization_id.clone())
            .or_default()
            .insert(id, note.clone());
        Ok(note)
    }

    async fn list(&self, organization_id: &OrganizationId) -> Result<Vec<Note>, NoteStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner
            .by_org
            .get(organization_id)
            .map(|notes| notes.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, organization_id: &OrganizationId, id: NoteId) -> Result<Option<Note>, NoteStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner.by_org.get(organization_id).and_then(|notes| notes.get(&id)).cloned())
    }
}
