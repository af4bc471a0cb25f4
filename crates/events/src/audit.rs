use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tenantnotes_core::{NoteId, OrganizationId, UserId};

/// Kind of mutating action being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CreateNote,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateNote => "CREATE_NOTE",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one successful mutation.
///
/// Notes:
/// - built only from server-trusted values (bound identity + persisted entity)
/// - never mutated after construction; fields are read through accessors
/// - `event_id` identifies redeliveries of the same event
/// - the JSON form is the wire format on the audit queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    event_id: Uuid,
    action: AuditAction,
    note_id: NoteId,
    organization_id: OrganizationId,
    user_id: UserId,
    details: String,
    timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        event_id: Uuid,
        action: AuditAction,
        note_id: NoteId,
        organization_id: OrganizationId,
        user_id: UserId,
        details: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            action,
            note_id,
            organization_id,
            user_id,
            details: details.into(),
            timestamp,
        }
    }

    /// `CREATE_NOTE` event for a freshly persisted note.
    pub fn note_created(
        note_id: NoteId,
        organization_id: OrganizationId,
        user_id: UserId,
        title: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            Uuid::now_v7(),
            AuditAction::CreateNote,
            note_id,
            organization_id,
            user_id,
            format!("Note created with title: {title}"),
            timestamp,
        )
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    pub fn note_id(&self) -> NoteId {
        self.note_id
    }

    pub fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Serialize to the queue wire format.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse the queue wire format. Unknown actions and blank identifiers fail.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}
