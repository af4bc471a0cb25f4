use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tenantnotes_core::{DomainError, DomainResult, NoteId, OrganizationId, UserId};

/// Upper bound on title length (in characters).
pub const MAX_TITLE_CHARS: usize = 255;

/// Persisted note, always owned by exactly one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub organization_id: OrganizationId,
    #[serde(rename = "user_id")]
    pub owner_user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// A validated, not-yet-persisted note.
///
/// The owning organization and user come from the caller's verified identity;
/// nothing here is read from client-supplied tenant fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    title: String,
    content: String,
    organization_id: OrganizationId,
    owner_user_id: UserId,
}

impl NewNote {
    /// Validate business rules for a new note.
    ///
    /// - title must be non-blank and at most [`MAX_TITLE_CHARS`] characters
    /// - content is free-form (may be empty)
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        organization_id: OrganizationId,
        owner_user_id: UserId,
    ) -> DomainResult<Self> {
        let title = title.into();
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("title must not be empty"));
        }
        if trimmed.chars().count() > MAX_TITLE_CHARS {
            return Err(DomainError::validation(format!(
                "title must be at most {MAX_TITLE_CHARS} characters"
            )));
        }

        Ok(Self {
            title: trimmed.to_string(),
            content: content.into(),
            organization_id,
            owner_user_id,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }

    pub fn owner_user_id(&self) -> &UserId {
        &self.owner_user_id
    }

    /// Materialize the persisted form once the store has assigned identity.
    pub fn into_note(self, id: NoteId, created_at: DateTime<Utc>) -> Note {
        Note {
            id,
            title: self.title,
            content: self.content,
            organization_id: self.organization_id,
            owner_user_id: self.owner_user_id,
            created_at,
        }
    }
}
