//! Owner pseudonymization for emitted audit events.

use crate::domain::OwnerId;
use crate::errors::{CredvaultError, Result};
use crate::secrets::SecretString;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex characters kept from the keyed digest
const PSEUDONYM_LEN: usize = 24;

/// Maps owner IDs to the form recorded in audit events.
///
/// Keyed mode is stable for one key, so events for the same owner still
/// correlate, but the mapping cannot be reversed without the key.
#[derive(Clone)]
pub enum OwnerPseudonymizer {
    Passthrough,
    Keyed(SecretString),
}

impl OwnerPseudonymizer {
    pub fn keyed(key: SecretString) -> Result<Self> {
        if key.is_blank() {
            return Err(CredvaultError::config("Pseudonym key cannot be empty"));
        }
        Ok(Self::Keyed(key))
    }

    pub fn from_config(config: &crate::config::AuditConfig) -> Result<Self> {
        match (config.pseudonymize_owners, &config.pseudonym_key) {
            (false, _) => Ok(Self::Passthrough),
            (true, Some(key)) => Self::keyed(key.clone()),
            (true, None) => {
                Err(CredvaultError::config("Owner pseudonymization enabled without a key"))
            }
        }
    }

    pub fn apply(&self, owner: &OwnerId) -> String {
        match self {
            Self::Passthrough => owner.as_str().to_string(),
            Self::Keyed(key) => {
                // HMAC accepts keys of any length; new_from_slice cannot fail here.
                let Ok(mut mac) = HmacSha256::new_from_slice(key.expose_secret().as_bytes())
                else {
                    return "owner:unavailable".to_string();
                };
                mac.update(owner.as_str().as_bytes());
                let mut digest = hex::encode(mac.finalize().into_bytes());
                digest.truncate(PSEUDONYM_LEN);
                format!("owner:{}", digest)
            }
        }
    }
}

impl std::fmt::Debug for OwnerPseudonymizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passthrough => f.write_str("OwnerPseudonymizer::Passthrough"),
            Self::Keyed(_) => f.write_str("OwnerPseudonymizer::Keyed([REDACTED])"),
        }
    }
}

impl Default for OwnerPseudonymizer {
    fn default() -> Self {
        Self::Passthrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;

    fn owner(s: &str) -> OwnerId {
        OwnerId::parse(s).unwrap()
    }

    #[test]
    fn test_passthrough_keeps_owner() {
        assert_eq!(OwnerPseudonymizer::Passthrough.apply(&owner("user-1")), "user-1");
    }

    #[test]
    fn test_keyed_is_stable_and_hides_owner() {
        let p = OwnerPseudonymizer::keyed(SecretString::new("k".repeat(32))).unwrap();
        let a = p.apply(&owner("user-1"));

        assert_eq!(a, p.apply(&owner("user-1")));
        assert_ne!(a, p.apply(&owner("user-2")));
        assert!(!a.contains("user-1"));
        assert!(a.starts_with("owner:"));
    }

    #[test]
    fn test_different_keys_give_different_pseudonyms() {
        let a = OwnerPseudonymizer::keyed(SecretString::new("a".repeat(32))).unwrap();
        let b = OwnerPseudonymizer::keyed(SecretString::new("b".repeat(32))).unwrap();
        assert_ne!(a.apply(&owner("user-1")), b.apply(&owner("user-1")));
    }

    #[test]
    fn test_from_config() {
        let mut config = AuditConfig::default();
        assert!(matches!(
            OwnerPseudonymizer::from_config(&config).unwrap(),
            OwnerPseudonymizer::Passthrough
        ));

        config.pseudonymize_owners = true;
        assert!(OwnerPseudonymizer::from_config(&config).is_err());

        config.pseudonym_key = Some(SecretString::new("p".repeat(32)));
        assert!(format!("{:?}", OwnerPseudonymizer::from_config(&config).unwrap()).contains("REDACTED"));
    }
}
