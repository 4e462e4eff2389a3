//! Audit event shape.
//!
//! Events are built from typed values only. There is no constructor that
//! accepts a secret, a vault reference or a full fingerprint.

use crate::domain::{ConsentActor, Fingerprint};
use crate::errors::{CredvaultError, ErrorKind};
use crate::resolver::{DenialReason, ResolutionTier};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Outcome recorded for a gate or resolver operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    NotFound,
    Forbidden,
    Unavailable,
    /// Request violated a data-model constraint and was not persisted
    Rejected,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Unavailable => "unavailable",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_error(error: &CredvaultError) -> Self {
        match error.kind() {
            ErrorKind::NotFound => Self::NotFound,
            ErrorKind::Forbidden => Self::Forbidden,
            ErrorKind::Unavailable => Self::Unavailable,
            ErrorKind::ConstraintViolation => Self::Rejected,
        }
    }

    /// Outcome recorded for a terminal Denied resolution. The denial reason
    /// travels separately in [`AuditEvent::reason`].
    pub fn from_denial(reason: DenialReason) -> Self {
        match reason {
            DenialReason::NoConsent | DenialReason::NoCredential => Self::NotFound,
            DenialReason::Unavailable => Self::Unavailable,
        }
    }

    pub fn from_result<T>(result: &Result<T, CredvaultError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => Self::from_error(e),
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    /// Owner identifier, pseudonymized when the deployment asks for it.
    /// Filled in by the emitter.
    pub owner: Option<String>,
    pub operation: &'static str,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<ResolutionTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<ConsentActor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint_prefix: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(operation: &'static str, outcome: AuditOutcome) -> Self {
        Self {
            owner: None,
            operation,
            outcome,
            tier: None,
            reason: None,
            actor: None,
            fingerprint_prefix: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn for_result<T>(operation: &'static str, result: &Result<T, CredvaultError>) -> Self {
        Self::new(operation, AuditOutcome::from_result(result))
    }

    pub fn with_tier(mut self, tier: ResolutionTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_reason(mut self, reason: DenialReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_actor(mut self, actor: ConsentActor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Attach the display prefix of a fingerprint
    pub fn with_fingerprint(mut self, fingerprint: &Fingerprint) -> Self {
        self.fingerprint_prefix = Some(fingerprint.display_prefix().to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::SecretString;

    #[test]
    fn test_outcome_from_error_kind() {
        assert_eq!(
            AuditOutcome::from_error(&CredvaultError::not_found("credential", "x")),
            AuditOutcome::NotFound
        );
        assert_eq!(
            AuditOutcome::from_error(&CredvaultError::timeout("vault.retrieve", 10)),
            AuditOutcome::Unavailable
        );
        assert_eq!(
            AuditOutcome::from_error(&CredvaultError::constraint("empty")),
            AuditOutcome::Rejected
        );
        assert_eq!(AuditOutcome::from_result::<()>(&Ok(())), AuditOutcome::Success);
        assert_eq!(AuditOutcome::from_denial(DenialReason::NoConsent), AuditOutcome::NotFound);
        assert_eq!(AuditOutcome::from_denial(DenialReason::Unavailable), AuditOutcome::Unavailable);
    }

    #[test]
    fn test_fingerprint_is_truncated() {
        let secret = SecretString::new("sk-live-abcdef");
        let fingerprint = Fingerprint::of(&secret);
        let event = AuditEvent::new("insert_or_replace_credential", AuditOutcome::Success)
            .with_fingerprint(&fingerprint);

        let prefix = event.fingerprint_prefix.unwrap();
        assert_eq!(prefix.len(), crate::domain::FINGERPRINT_DISPLAY_LEN);
        assert_ne!(prefix, fingerprint.as_str());
    }

    #[test]
    fn test_event_serialization_skips_empty_fields() {
        let event = AuditEvent::new("resolve", AuditOutcome::NotFound)
            .with_reason(DenialReason::NoConsent);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["outcome"], "not_found");
        assert_eq!(json["reason"], "no_consent");
        assert!(json.get("tier").is_none());
    }
}
