//! Credential errors.

use thiserror::Error;

use crate::claims::TokenValidationError;

/// Errors raised while minting or verifying identity tokens.
///
/// `InvalidToken` means "untrusted" and `ExpiredToken` means "stale"; callers
/// may collapse both into a 401 but should keep them apart in logs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The signing secret is unusable or the claims could not be encoded.
    #[error("token signing failed: {0}")]
    Signing(String),

    /// Malformed token, bad signature, wrong issuer or algorithm, bad claims.
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Every check passed except the expiry check.
    #[error("token has expired")]
    ExpiredToken,
}

impl AuthError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidToken(msg.into())
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Self::ExpiredToken)
    }
}

impl From<TokenValidationError> for AuthError {
    fn from(value: TokenValidationError) -> Self {
        match value {
            TokenValidationError::Expired => Self::ExpiredToken,
            other => Self::InvalidToken(other.to_string()),
        }
    }
}
