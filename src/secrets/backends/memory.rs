//! In-process vault for development and tests.

use crate::domain::VaultRef;
use crate::errors::{CredvaultError, Result};
use crate::secrets::vault::{SecretVault, VaultBackendType};
use crate::secrets::SecretString;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

const REF_PREFIX: &str = "mem";

/// Vault entries held in a concurrent map. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryVault {
    entries: Arc<DashMap<String, SecretString>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, vault_ref: &VaultRef) -> bool {
        self.entries.contains_key(vault_ref.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SecretVault for MemoryVault {
    async fn store(&self, plaintext: &SecretString) -> Result<VaultRef> {
        let vault_ref = VaultRef::generate(REF_PREFIX);
        self.entries.insert(vault_ref.as_str().to_string(), plaintext.clone());
        Ok(vault_ref)
    }

    async fn retrieve(&self, vault_ref: &VaultRef) -> Result<SecretString> {
        self.entries
            .get(vault_ref.as_str())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CredvaultError::not_found("vault_entry", vault_ref.short()))
    }

    async fn delete(&self, vault_ref: &VaultRef) -> Result<()> {
        self.entries.remove(vault_ref.as_str());
        Ok(())
    }

    fn backend_type(&self) -> VaultBackendType {
        VaultBackendType::Memory
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_retrieve_delete() {
        let vault = MemoryVault::new();
        let vault_ref = vault.store(&SecretString::new("sk-abc")).await.unwrap();

        assert!(vault_ref.as_str().starts_with("mem_"));
        assert_eq!(vault.retrieve(&vault_ref).await.unwrap().expose_secret(), "sk-abc");

        vault.delete(&vault_ref).await.unwrap();
        assert!(vault.retrieve(&vault_ref).await.unwrap_err().is_not_found());

        // Idempotent
        vault.delete(&vault_ref).await.unwrap();
        assert!(vault.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let vault = MemoryVault::new();
        let clone = vault.clone();
        let vault_ref = vault.store(&SecretString::new("k")).await.unwrap();

        assert!(clone.contains(&vault_ref));
        assert_eq!(clone.len(), 1);
    }
}
