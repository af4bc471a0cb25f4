//! `tenantnotes-auth`: authentication/authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage: it mints and
//! verifies identity tokens and evaluates the policy rule table, nothing more.

pub mod claims;
pub mod error;
pub mod pattern;
pub mod policy;
pub mod roles;
pub mod token;

pub use claims::{IdentityClaims, TOKEN_ISSUER, TOKEN_TTL_HOURS, TokenValidationError, validate_claims};
pub use error::AuthError;
pub use policy::{
    AccessRequest, Effect, PolicyDecision, PolicyEvaluationError, PolicyGate, PolicyLoadError,
    PolicyRule, PolicyTable, RoleGrant, RuleTablePolicy,
};
pub use roles::Role;
pub use token::{Hs256JwtValidator, Hs256TokenIssuer, JwtValidator, TokenIssuer};
