//! Strongly-typed identifiers used across the domain.
//!
//! Tenant and user identifiers are opaque, caller-chosen strings (they arrive
//! inside signed tokens). They must be non-empty once trimmed and at most
//! [`MAX_ID_CHARS`] characters; construction enforces it, and deserialization
//! goes through the same check so a bad claim can never produce a valid
//! identifier.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Upper bound on organization and user identifier length (in characters).
pub const MAX_ID_CHARS: usize = 50;

/// Identifier of an organization (multi-tenant boundary).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrganizationId(String);

/// Identifier of a user (actor identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

macro_rules! impl_string_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Build an identifier, rejecting blank or overlong values.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(DomainError::invalid_id(format!("{} must not be empty", $name)));
                }
                if value.chars().count() > MAX_ID_CHARS {
                    return Err(DomainError::invalid_id(format!(
                        "{} must be at most {MAX_ID_CHARS} characters",
                        $name
                    )));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_newtype!(OrganizationId, "OrganizationId");
impl_string_newtype!(UserId, "UserId");

/// Identifier of a note (store-assigned, positive).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(i64);

impl NoteId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for NoteId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for NoteId {
    type Err = DomainError;

    /// Only the canonical decimal form is accepted (`7`, not `07` or `+7`), so
    /// one note has exactly one path.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .parse::<i64>()
            .map_err(|e| DomainError::invalid_id(format!("NoteId: {e}")))?;
        if value <= 0 {
            return Err(DomainError::invalid_id("NoteId: must be positive"));
        }
        if value.to_string() != s {
            return Err(DomainError::invalid_id("NoteId: must be written in canonical form"));
        }
        Ok(Self(value))
    }
}
