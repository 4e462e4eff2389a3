//! Secret Vault contract.
//!
//! Only the Access Gate holds a handle to a [`SecretVault`]. Everything else
//! reaches secrets through the gate's narrow operations.

use crate::domain::VaultRef;
use crate::errors::Result;
use crate::secrets::SecretString;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which adapter backs the vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultBackendType {
    /// AES-256-GCM encrypted rows in the local database
    Database,
    /// Process memory; development and tests
    Memory,
    /// HashiCorp Vault KV v2
    Hashicorp,
}

impl VaultBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Memory => "memory",
            Self::Hashicorp => "hashicorp",
        }
    }
}

impl FromStr for VaultBackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "database" => Ok(Self::Database),
            "memory" => Ok(Self::Memory),
            "hashicorp" | "vault" => Ok(Self::Hashicorp),
            _ => Err(format!("Unknown vault backend: {}", s)),
        }
    }
}

impl fmt::Display for VaultBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque encrypt/store/retrieve/delete of secrets by reference.
///
/// Implementations must be Send + Sync for use in async contexts.
#[async_trait]
pub trait SecretVault: Send + Sync + fmt::Debug {
    /// Encrypt and persist `plaintext`, returning a fresh reference.
    async fn store(&self, plaintext: &SecretString) -> Result<VaultRef>;

    /// Fetch the plaintext behind `vault_ref`.
    ///
    /// Fails with `NotFound` if the reference is unknown or was deleted.
    async fn retrieve(&self, vault_ref: &VaultRef) -> Result<SecretString>;

    /// Remove the entry. Deleting a missing reference succeeds.
    async fn delete(&self, vault_ref: &VaultRef) -> Result<()>;

    fn backend_type(&self) -> VaultBackendType;

    async fn health_check(&self) -> Result<()>;
}
