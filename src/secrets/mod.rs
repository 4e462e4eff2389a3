//! Secret Vault capability.
//!
//! The [`SecretVault`] trait is the narrow store/retrieve/delete contract the
//! Access Gate consumes. Three adapters implement it:
//!
//! - [`DatabaseVault`]: AES-256-GCM sealed rows in the local database
//! - [`HashicorpVault`]: HashiCorp Vault KV v2
//! - [`MemoryVault`]: process memory, for development and tests
//!
//! ```rust,ignore
//! let vault = build_vault(&config.vault, pool.clone())?;
//! let gate = AccessGate::new(pool, vault, gate_settings);
//! ```

pub mod backends;
pub mod encryption;
pub mod types;
pub mod vault;

pub use backends::{DatabaseVault, HashicorpVault, MemoryVault};
pub use encryption::{CipherConfig, SecretCipher};
pub use types::SecretString;
pub use vault::{SecretVault, VaultBackendType};

use crate::config::VaultConfig;
use crate::errors::{CredvaultError, Result};
use crate::storage::DbPool;
use std::sync::Arc;

/// Construct the adapter selected by configuration
pub fn build_vault(config: &VaultConfig, pool: DbPool) -> Result<Arc<dyn SecretVault>> {
    match config.backend {
        VaultBackendType::Database => {
            let master_key = config.encryption_key.clone().ok_or_else(|| {
                CredvaultError::config("vault.encryption_key is required for the database vault")
            })?;
            let cipher = SecretCipher::new(&CipherConfig {
                master_key,
                key_version: config.key_version.clone(),
            })?;
            Ok(Arc::new(DatabaseVault::new(pool, Arc::new(cipher))))
        }
        VaultBackendType::Hashicorp => {
            let hashicorp = config.hashicorp.as_ref().ok_or_else(|| {
                CredvaultError::config("vault.hashicorp settings are required for the hashicorp vault")
            })?;
            Ok(Arc::new(HashicorpVault::new(hashicorp)?))
        }
        VaultBackendType::Memory => {
            tracing::warn!("Using in-memory secret vault; secrets will not survive a restart");
            Ok(Arc::new(MemoryVault::new()))
        }
    }
}
