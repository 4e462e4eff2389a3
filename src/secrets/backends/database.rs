//! Database vault backend
//!
//! Secrets are sealed with AES-256-GCM and stored in `vault_secrets`, keyed
//! by a freshly generated reference. The reference is bound into each
//! ciphertext as associated data.

use crate::domain::VaultRef;
use crate::errors::{CredvaultError, Result};
use crate::secrets::encryption::SecretCipher;
use crate::secrets::vault::{SecretVault, VaultBackendType};
use crate::secrets::SecretString;
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::FromRow;
use std::sync::Arc;
use tracing::{debug, error};

const REF_PREFIX: &str = "vlt";

#[derive(Debug, Clone, FromRow)]
struct VaultSecretRow {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub key_version: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseVault {
    pool: DbPool,
    cipher: Arc<SecretCipher>,
}

impl DatabaseVault {
    pub fn new(pool: DbPool, cipher: Arc<SecretCipher>) -> Self {
        Self { pool, cipher }
    }
}

#[async_trait]
impl SecretVault for DatabaseVault {
    async fn store(&self, plaintext: &SecretString) -> Result<VaultRef> {
        let vault_ref = VaultRef::generate(REF_PREFIX);
        let sealed =
            self.cipher.seal(plaintext.expose_secret().as_bytes(), vault_ref.as_str().as_bytes())?;

        sqlx::query(
            "INSERT INTO vault_secrets (id, ciphertext, nonce, key_version, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(vault_ref.as_str())
        .bind(&sealed.ciphertext)
        .bind(&sealed.nonce)
        .bind(&sealed.key_version)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, vault_ref = %vault_ref, "Failed to store vault entry");
            CredvaultError::database(e, "Failed to store vault entry")
        })?;

        debug!(vault_ref = %vault_ref, "Stored vault entry");
        Ok(vault_ref)
    }

    async fn retrieve(&self, vault_ref: &VaultRef) -> Result<SecretString> {
        let row = sqlx::query_as::<_, VaultSecretRow>(
            "SELECT ciphertext, nonce, key_version FROM vault_secrets WHERE id = $1",
        )
        .bind(vault_ref.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, vault_ref = %vault_ref, "Failed to read vault entry");
            CredvaultError::database(e, "Failed to read vault entry")
        })?
        .ok_or_else(|| CredvaultError::not_found("vault_entry", vault_ref.short()))?;

        if row.key_version != self.cipher.key_version() {
            // TODO: keep retired keys in a keyring so entries sealed under an
            // older version stay readable after rotation.
            return Err(CredvaultError::internal(format!(
                "Vault entry sealed with key version '{}' but active key is '{}'",
                row.key_version,
                self.cipher.key_version()
            )));
        }

        let plaintext =
            self.cipher.open(&row.ciphertext, &row.nonce, vault_ref.as_str().as_bytes())?;
        let secret = String::from_utf8(plaintext).map_err(|_| {
            CredvaultError::internal("Vault entry does not decrypt to UTF-8")
        })?;

        Ok(SecretString::new(secret))
    }

    async fn delete(&self, vault_ref: &VaultRef) -> Result<()> {
        sqlx::query("DELETE FROM vault_secrets WHERE id = $1")
            .bind(vault_ref.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| CredvaultError::database(e, "Failed to delete vault entry"))?;

        Ok(())
    }

    fn backend_type(&self) -> VaultBackendType {
        VaultBackendType::Database
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM vault_secrets LIMIT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CredvaultError::database(e, "Vault table health check failed"))?;
        Ok(())
    }
}
