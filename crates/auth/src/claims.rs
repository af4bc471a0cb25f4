use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tenantnotes_core::{OrganizationId, UserId};

use crate::Role;

/// Issuer stamped into (and required from) every token.
pub const TOKEN_ISSUER: &str = "tenantnotes";

/// Fixed token lifetime.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Tolerated clock skew for `iat` only; expiry is checked exactly.
const MAX_ISSUED_AT_SKEW_SECS: i64 = 30;

/// Verified identity claims.
///
/// Wire shape is `{user_id, org_id, role, iat, exp, iss}` with unix-second
/// timestamps. Empty `user_id` / `org_id` fail to deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub user_id: UserId,

    #[serde(rename = "org_id")]
    pub organization_id: OrganizationId,

    pub role: Role,

    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Expiration (unix seconds).
    pub exp: i64,

    pub iss: String,
}

impl IdentityClaims {
    /// Build claims issued at `now` with the standard lifetime.
    pub fn new(user_id: UserId, organization_id: OrganizationId, role: Role, now: DateTime<Utc>) -> Self {
        let expires = now + Duration::hours(TOKEN_TTL_HOURS);
        Self {
            user_id,
            organization_id,
            role,
            iat: now.timestamp(),
            exp: expires.timestamp(),
            iss: TOKEN_ISSUER.to_string(),
        }
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("unexpected issuer '{0}'")]
    WrongIssuer(String),

    #[error("role claim is empty")]
    EmptyRole,
}

/// Deterministically validate decoded claims.
///
/// Structural checks run first; the expiry check runs last so that
/// `Expired` is only reported for a token that is otherwise trustworthy.
pub fn validate_claims(claims: &IdentityClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.iss != TOKEN_ISSUER {
        return Err(TokenValidationError::WrongIssuer(claims.iss.clone()));
    }
    if claims.role.is_blank() {
        return Err(TokenValidationError::EmptyRole);
    }
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if claims.iat > now.timestamp() + MAX_ISSUED_AT_SKEW_SECS {
        return Err(TokenValidationError::NotYetValid);
    }
    if now.timestamp() >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_at(now: DateTime<Utc>) -> IdentityClaims {
        IdentityClaims::new(
            UserId::new("u1").unwrap(),
            OrganizationId::new("orgA").unwrap(),
            Role::new("admin"),
            now,
        )
    }

    #[test]
    fn lifetime_is_twenty_four_hours() {
        let now = Utc::now();
        let c = claims_at(now);
        assert_eq!(c.exp - c.iat, 24 * 3600);
        assert_eq!(c.issued_at().timestamp(), now.timestamp());
    }

    #[test]
    fn fresh_claims_validate() {
        let now = Utc::now();
        assert_eq!(validate_claims(&claims_at(now), now), Ok(()));
    }

    #[test]
    fn expiry_is_exact() {
        let now = Utc::now();
        let c = claims_at(now);
        let at_expiry = c.expires_at();
        assert_eq!(validate_claims(&c, at_expiry), Err(TokenValidationError::Expired));
        assert_eq!(validate_claims(&c, at_expiry - Duration::seconds(1)), Ok(()));
    }

    #[test]
    fn structural_errors_win_over_expiry() {
        let now = Utc::now();
        let mut c = claims_at(now - Duration::hours(48));
        c.iss = "someone-else".to_string();
        assert!(matches!(validate_claims(&c, now), Err(TokenValidationError::WrongIssuer(_))));
    }

    #[test]
    fn future_issued_tokens_are_rejected() {
        let now = Utc::now();
        let c = claims_at(now + Duration::hours(1));
        assert_eq!(validate_claims(&c, now), Err(TokenValidationError::NotYetValid));
    }
}
