//! Credential store records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::id::{OwnerId, VaultRef};
use super::service::ServiceName;
use crate::secrets::SecretString;

/// Hex characters kept from the SHA-256 digest.
const FINGERPRINT_LEN: usize = 16;

/// Hex characters that may leave the process in audit events and UI.
pub const FINGERPRINT_DISPLAY_LEN: usize = 8;

/// Short, non-reversible identifier for a secret. Display/identification
/// only; never used to authenticate anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(secret: &SecretString) -> Self {
        let digest = Sha256::digest(secret.expose_secret().as_bytes());
        let mut encoded = hex::encode(digest);
        encoded.truncate(FINGERPRINT_LEN);
        Self(encoded)
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix safe to emit in audit events.
    pub fn display_prefix(&self) -> &str {
        let end = self.0.len().min(FINGERPRINT_DISPLAY_LEN);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live credential per (owner, service).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub owner_id: OwnerId,
    pub service: ServiceName,
    pub vault_ref: VaultRef,
    pub fingerprint: Fingerprint,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Metadata view of a credential for display. Carries no vault reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub service: ServiceName,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<&CredentialRecord> for CredentialSummary {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            service: record.service,
            fingerprint: record.fingerprint.display_prefix().to_string(),
            created_at: record.created_at,
            last_used_at: record.last_used_at,
        }
    }
}

/// Per-owner gateway settings. At least one of `vault_ref` and
/// `base_endpoint` is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub owner_id: OwnerId,
    pub vault_ref: Option<VaultRef>,
    pub fingerprint: Option<Fingerprint>,
    pub base_endpoint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GatewayConfig {
    pub fn has_secret(&self) -> bool {
        self.vault_ref.is_some()
    }
}

/// Who last changed a consent flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentActor {
    /// Default row created for a new owner
    System,
    /// The owner, via the trusted backend acting on their request
    Owner,
    /// An operator acting on the owner's explicit instruction
    Operator,
}

impl ConsentActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Owner => "owner",
            Self::Operator => "operator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "owner" => Some(Self::Owner),
            "operator" => Some(Self::Operator),
            _ => None,
        }
    }
}

/// Versioned team-fallback consent for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentFlag {
    pub owner_id: OwnerId,
    pub allow_team_fallback: bool,
    /// Incremented on every change; 1 for the default row.
    pub version: i64,
    pub updated_by: ConsentActor,
    pub updated_at: DateTime<Utc>,
}

impl ConsentFlag {
    /// Consent granted to every new owner.
    pub const DEFAULT_ALLOW_TEAM_FALLBACK: bool = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = Fingerprint::of(&SecretString::new("sk-abc"));
        let b = Fingerprint::of(&SecretString::new("sk-abc"));
        let c = Fingerprint::of(&SecretString::new("sk-abd"));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), FINGERPRINT_LEN);
        assert_eq!(a.display_prefix().len(), FINGERPRINT_DISPLAY_LEN);
        assert!(!a.as_str().contains("sk-abc"));
    }

    #[test]
    fn test_summary_uses_display_prefix() {
        let now = Utc::now();
        let record = CredentialRecord {
            owner_id: OwnerId::parse("u1").unwrap(),
            service: ServiceName::OpenAi,
            vault_ref: VaultRef::generate("vlt"),
            fingerprint: Fingerprint::of(&SecretString::new("sk-abc")),
            created_at: now,
            updated_at: now,
            last_used_at: None,
        };

        let summary = CredentialSummary::from(&record);
        assert_eq!(summary.fingerprint, record.fingerprint.display_prefix());
    }

    #[test]
    fn test_consent_actor_roundtrip() {
        for actor in [ConsentActor::System, ConsentActor::Owner, ConsentActor::Operator] {
            assert_eq!(ConsentActor::parse(actor.as_str()), Some(actor));
        }
        assert_eq!(ConsentActor::parse("admin"), None);
    }
}
