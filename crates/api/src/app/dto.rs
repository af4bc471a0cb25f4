use serde::{Deserialize, Serialize};

use tenantnotes_auth::Role;
use tenantnotes_core::{OrganizationId, UserId};
use tenantnotes_notes::Note;

use crate::context::{PrincipalContext, TenantContext};

// -------------------------
// Request DTOs
// -------------------------

/// Login body. Fields are optional here so a missing one is reported as a
/// validation error rather than a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: Option<String>,
    pub org_id: Option<String>,
    pub role: Option<String>,
}

/// Note creation body. Any tenant or owner fields a client adds are ignored.
#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    pub data: Note,
}

#[derive(Debug, Serialize)]
pub struct NoteListResponse {
    pub data: Vec<Note>,
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub organization_id: String,
    pub user_id: String,
    pub role: String,
}

impl WhoAmIResponse {
    pub fn from_contexts(tenant: &TenantContext, principal: &PrincipalContext) -> Self {
        Self {
            organization_id: tenant.organization_id().to_string(),
            user_id: principal.user_id().to_string(),
            role: principal.role().to_string(),
        }
    }
}

impl LoginRequest {
    /// Validate the asserted identity; every field is required.
    pub fn into_identity(self) -> Result<(UserId, OrganizationId, Role), String> {
        let user_id = required_field("user_id", self.user_id)?;
        let org_id = required_field("org_id", self.org_id)?;
        let role = required_field("role", self.role)?;

        let user_id = UserId::new(user_id).map_err(|e| e.to_string())?;
        let organization_id = OrganizationId::new(org_id).map_err(|e| e.to_string())?;
        Ok((user_id, organization_id, Role::new(role)))
    }
}

fn required_field(name: &'static str, value: Option<String>) -> Result<String, String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(format!("{name} is required")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(user: Option<&str>, org: Option<&str>, role: Option<&str>) -> LoginRequest {
        LoginRequest {
            user_id: user.map(str::to_string),
            org_id: org.map(str::to_string),
            role: role.map(str::to_string),
        }
    }

    #[test]
    fn login_requires_every_field() {
        let (u, o, r) = login(Some(" u1 "), Some("orgA"), Some("admin")).into_identity().unwrap();
        assert_eq!(u.as_str(), "u1");
        assert_eq!(o.as_str(), "orgA");
        assert_eq!(r.as_str(), "admin");

        assert_eq!(
            login(None, Some("orgA"), Some("admin")).into_identity().unwrap_err(),
            "user_id is required"
        );
        assert_eq!(
            login(Some("u1"), Some("  "), Some("admin")).into_identity().unwrap_err(),
            "org_id is required"
        );
        assert_eq!(login(Some("u1"), Some("orgA"), Some("")).into_identity().unwrap_err(), "role is required");
    }
}
