//! Domain ID Types with NewType Pattern
//!
//! Type-safe wrappers for owner identities and vault references. Both are
//! stored as TEXT in SQLite and carry the sqlx trait implementations needed
//! to bind and decode them directly.

use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::{Decode, Encode, Sqlite, Type};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum accepted length for an owner identity.
pub const MAX_OWNER_ID_LEN: usize = 128;

/// Number of characters of a vault reference shown in Debug/Display output.
const VAULT_REF_DISPLAY_LEN: usize = 8;

/// Error returned when parsing an owner identity fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OwnerIdError {
    #[error("owner id cannot be empty")]
    Empty,
    #[error("owner id exceeds {MAX_OWNER_ID_LEN} characters")]
    TooLong,
    #[error("owner id contains whitespace or control characters")]
    InvalidCharacter,
}

/// Macro to generate the sqlx plumbing shared by string-backed IDs
macro_rules! sqlite_text_id {
    ($name:ident) => {
        impl Type<Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <String as Type<Sqlite>>::type_info()
            }
        }

        impl<'q> Encode<'q, Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<IsNull, BoxDynError> {
                <String as Encode<'q, Sqlite>>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> Decode<'r, Sqlite> for $name {
            fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
                let s = <String as Decode<'r, Sqlite>>::decode(value)?;
                Ok(Self(s))
            }
        }
    };
}

/// Opaque identity of the account that owns credentials.
///
/// Immutable once a record has been created for it. Owner IDs are supplied
/// by the identity layer and are not required to be UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create a fresh random owner ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse and validate an owner identity
    pub fn parse(s: &str) -> Result<Self, OwnerIdError> {
        if s.is_empty() {
            return Err(OwnerIdError::Empty);
        }
        if s.len() > MAX_OWNER_ID_LEN {
            return Err(OwnerIdError::TooLong);
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(OwnerIdError::InvalidCharacter);
        }
        Ok(Self(s.to_string()))
    }

    /// Create an ID from an existing string (for database retrieval)
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to inner string value
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerId {
    type Err = OwnerIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for OwnerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

sqlite_text_id!(OwnerId);

/// Opaque pointer to an encrypted secret held by a [`crate::secrets::SecretVault`].
///
/// Carries no information about the secret. Debug and Display only show a
/// short prefix so a reference never lands in logs in full; use
/// [`VaultRef::as_str`] where the full value is required.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultRef(String);

impl VaultRef {
    /// Generate a new reference with the given adapter prefix (e.g. `vlt`)
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}_{}", prefix, Uuid::new_v4().simple()))
    }

    /// Wrap an existing reference string (for database retrieval)
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Full reference value. Do not log the result.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short, log-safe form of the reference
    pub fn short(&self) -> String {
        let prefix: String = self.0.chars().take(VAULT_REF_DISPLAY_LEN).collect();
        format!("{}…", prefix)
    }
}

impl fmt::Debug for VaultRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VaultRef({})", self.short())
    }
}

impl fmt::Display for VaultRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

sqlite_text_id!(VaultRef);
