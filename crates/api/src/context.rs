use tenantnotes_auth::{IdentityClaims, Role};
use tenantnotes_core::{OrganizationId, UserId};

/// Tenant context for a request.
///
/// Built only from verified token claims and must be present for all
/// `/api` routes. Client headers never populate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    organization_id: OrganizationId,
}

impl TenantContext {
    pub fn new(organization_id: OrganizationId) -> Self {
        Self { organization_id }
    }

    pub fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }
}

/// Principal context for a request (authenticated user + claimed role).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    role: Role,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn role(&self) -> &Role {
        &self.role
    }
}

/// Split verified claims into the two request contexts.
pub fn contexts_from_claims(claims: IdentityClaims) -> (TenantContext, PrincipalContext) {
    (
        TenantContext::new(claims.organization_id),
        PrincipalContext::new(claims.user_id, claims.role),
    )
}
