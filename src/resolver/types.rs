//! Resolution results handed to the business layer.

use crate::domain::{OwnerId, ServiceName, VaultRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Precedence tier that produced a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    Gateway,
    Direct,
    TeamFallback,
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Direct => "direct",
            Self::TeamFallback => "team_fallback",
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why no credential was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Owner has revoked team-fallback consent
    NoConsent,
    /// No tier had a credential for the capability
    NoCredential,
    /// Vault or store stayed unreachable after bounded retries
    Unavailable,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoConsent => "no_consent",
            Self::NoCredential => "no_credential",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the secret for a resolved credential lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Owner-scoped vault entry; fetched through the gate just before use
    Vault(VaultRef),
    /// The process-wide team credential
    TeamFallback,
}

/// A ready-to-use credential handle. Never carries the secret itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub owner_id: OwnerId,
    /// Service the secret belongs to (`Gateway` for the gateway tier)
    pub service: ServiceName,
    pub tier: ResolutionTier,
    pub source: CredentialSource,
    pub endpoint: String,
}

/// Terminal state of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedCredential),
    Denied(DenialReason),
}

impl Resolution {
    pub fn tier(&self) -> Option<ResolutionTier> {
        match self {
            Self::Resolved(credential) => Some(credential.tier),
            Self::Denied(_) => None,
        }
    }

    pub fn denial(&self) -> Option<DenialReason> {
        match self {
            Self::Resolved(_) => None,
            Self::Denied(reason) => Some(*reason),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Label used for metrics and logs
    pub fn outcome_label(&self) -> &'static str {
        match self {
            Self::Resolved(credential) => credential.tier.as_str(),
            Self::Denied(reason) => reason.as_str(),
        }
    }

    /// End-user phrasing; never carries vault or store detail
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "key available",
            Self::Denied(_) => "no credential available for this feature",
        }
    }
}
