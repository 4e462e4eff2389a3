//! HashiCorp Vault backend (KV v2).
//!
//! Each secret is written under `{path_prefix}/{vault_ref}` as
//! `{"value": "<secret>"}`. Deletes remove all versions and metadata.

use crate::config::HashicorpVaultConfig;
use crate::domain::VaultRef;
use crate::errors::{CredvaultError, Result};
use crate::secrets::vault::{SecretVault, VaultBackendType};
use crate::secrets::SecretString;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{error, info};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

const REF_PREFIX: &str = "hcv";
const VALUE_FIELD: &str = "value";

pub struct HashicorpVault {
    client: VaultClient,
    mount: String,
    path_prefix: String,
}

impl std::fmt::Debug for HashicorpVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashicorpVault")
            .field("mount", &self.mount)
            .field("path_prefix", &self.path_prefix)
            .field("client", &"[VaultClient]")
            .finish()
    }
}

impl HashicorpVault {
    pub fn new(config: &HashicorpVaultConfig) -> Result<Self> {
        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.address);

        if let Some(token) = &config.token {
            settings_builder.token(token.expose_secret());
        }

        if let Some(namespace) = &config.namespace {
            settings_builder.namespace(Some(namespace.clone()));
        }

        let settings = settings_builder.build().map_err(|e| {
            CredvaultError::config(format!("Invalid HashiCorp Vault configuration: {}", e))
        })?;

        let client = VaultClient::new(settings).map_err(|e| {
            CredvaultError::config(format!("Failed to create HashiCorp Vault client: {}", e))
        })?;

        info!(address = %config.address, mount = %config.mount, "Initialized HashiCorp Vault backend");

        Ok(Self {
            client,
            mount: config.mount.clone(),
            path_prefix: config.path_prefix.trim_matches('/').to_string(),
        })
    }

    fn path_for(&self, vault_ref: &VaultRef) -> String {
        if self.path_prefix.is_empty() {
            vault_ref.as_str().to_string()
        } else {
            format!("{}/{}", self.path_prefix, vault_ref.as_str())
        }
    }
}

fn is_not_found(error: &ClientError) -> bool {
    matches!(error, ClientError::APIError { code: 404, .. })
}

fn unavailable(operation: &str, error: ClientError) -> CredvaultError {
    CredvaultError::unavailable(operation, error.to_string())
}

#[async_trait]
impl SecretVault for HashicorpVault {
    async fn store(&self, plaintext: &SecretString) -> Result<VaultRef> {
        let vault_ref = VaultRef::generate(REF_PREFIX);
        let mut data = HashMap::new();
        data.insert(VALUE_FIELD, plaintext.expose_secret());

        kv2::set(&self.client, &self.mount, &self.path_for(&vault_ref), &data).await.map_err(
            |e| {
                error!(error = %e, vault_ref = %vault_ref, "Failed to write secret to HashiCorp Vault");
                unavailable("vault.store", e)
            },
        )?;

        Ok(vault_ref)
    }

    async fn retrieve(&self, vault_ref: &VaultRef) -> Result<SecretString> {
        let data: HashMap<String, String> =
            match kv2::read(&self.client, &self.mount, &self.path_for(vault_ref)).await {
                Ok(data) => data,
                Err(e) if is_not_found(&e) => {
                    return Err(CredvaultError::not_found("vault_entry", vault_ref.short()))
                }
                Err(e) => {
                    error!(error = %e, vault_ref = %vault_ref, "Failed to read secret from HashiCorp Vault");
                    return Err(unavailable("vault.retrieve", e));
                }
            };

        data.get(VALUE_FIELD).map(|value| SecretString::new(value.as_str())).ok_or_else(|| {
            CredvaultError::internal(format!("Vault entry {} has no value field", vault_ref))
        })
    }

    async fn delete(&self, vault_ref: &VaultRef) -> Result<()> {
        match kv2::delete_metadata(&self.client, &self.mount, &self.path_for(vault_ref)).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => {
                error!(error = %e, vault_ref = %vault_ref, "Failed to delete secret from HashiCorp Vault");
                Err(unavailable("vault.delete", e))
            }
        }
    }

    fn backend_type(&self) -> VaultBackendType {
        VaultBackendType::Hashicorp
    }

    async fn health_check(&self) -> Result<()> {
        vaultrs::sys::health(&self.client)
            .await
            .map_err(|e| unavailable("vault.health", e))?;
        Ok(())
    }
}
