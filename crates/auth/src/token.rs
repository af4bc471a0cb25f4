//! HS256 identity tokens: minting (issuer) and verification (validator).
//!
//! Both sides are constructed explicitly with the shared secret and handed to
//! whoever needs them; nothing here reads process-global state.

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use tenantnotes_core::{OrganizationId, UserId};

use crate::claims::{IdentityClaims, TOKEN_ISSUER, validate_claims};
use crate::{AuthError, Role};

/// Mints signed identity tokens.
pub trait TokenIssuer: Send + Sync {
    fn issue_at(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError>;

    fn issue(&self, user_id: UserId, organization_id: OrganizationId, role: Role) -> Result<String, AuthError> {
        self.issue_at(user_id, organization_id, role, Utc::now())
    }
}

/// Verifies a token and returns its claims (all-or-nothing).
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<IdentityClaims, AuthError>;
}

#[derive(Clone)]
pub struct Hs256TokenIssuer {
    secret: Vec<u8>,
}

impl Hs256TokenIssuer {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }
}

impl core::fmt::Debug for Hs256TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256TokenIssuer").field("secret", &"<redacted>").finish()
    }
}

impl TokenIssuer for Hs256TokenIssuer {
    fn issue_at(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::Signing("signing secret is empty".to_string()));
        }
        if role.is_blank() {
            return Err(AuthError::Signing("role must not be empty".to_string()));
        }

        let claims = IdentityClaims::new(user_id, organization_id, role, now);
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| AuthError::Signing(e.to_string()))
    }
}

#[derive(Clone)]
pub struct Hs256JwtValidator {
    secret: Vec<u8>,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by `validate_claims` after every other check so
        // that an expired-but-authentic token is reported as stale, not forged.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iat", "iss"]);

        Self {
            secret: secret.into(),
            validation,
        }
    }
}

impl core::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hs256JwtValidator").field("secret", &"<redacted>").finish()
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<IdentityClaims, AuthError> {
        if self.secret.is_empty() {
            return Err(AuthError::invalid("verification secret is empty"));
        }

        let data = jsonwebtoken::decode::<IdentityClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &self.validation,
        )
        .map_err(map_jwt_error)?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        ErrorKind::InvalidSignature => AuthError::invalid("signature mismatch"),
        ErrorKind::InvalidAlgorithm => AuthError::invalid("unexpected signing algorithm"),
        ErrorKind::InvalidIssuer => AuthError::invalid("unexpected issuer"),
        ErrorKind::MissingRequiredClaim(claim) => AuthError::invalid(format!("missing claim '{claim}'")),
        ErrorKind::Json(e) => AuthError::invalid(format!("malformed claims: {e}")),
        _ => AuthError::invalid(err.to_string()),
    }
}
