//! Gateway config repository
//!
//! Zero or one row per owner. The table's CHECK constraints reject a row with
//! neither secret nor endpoint; the gate validates the same rule first so
//! callers get a `ConstraintViolation` instead of a database error.

use crate::domain::{Fingerprint, GatewayConfig, OwnerId, VaultRef};
use crate::errors::{CredvaultError, Result};
use crate::storage::DbPool;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

#[derive(Debug, Clone, FromRow)]
struct GatewayRow {
    pub owner_id: String,
    pub vault_ref: Option<String>,
    pub fingerprint: Option<String>,
    pub base_endpoint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GatewayRow> for GatewayConfig {
    fn from(row: GatewayRow) -> Self {
        Self {
            owner_id: OwnerId::from_string(row.owner_id),
            vault_ref: row.vault_ref.map(VaultRef::from_string),
            fingerprint: row.fingerprint.map(Fingerprint::from_string),
            base_endpoint: row.base_endpoint,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Secret half of a gateway config being written
#[derive(Debug, Clone)]
pub struct GatewaySecretRef<'a> {
    pub vault_ref: &'a VaultRef,
    pub fingerprint: &'a Fingerprint,
}

const SELECT_COLUMNS: &str =
    "owner_id, vault_ref, fingerprint, base_endpoint, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct GatewayRepository {
    pool: DbPool,
}

impl GatewayRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Live gateway config for the owner, if any
    #[instrument(skip(self), name = "db_find_gateway")]
    pub async fn find(&self, owner_id: &OwnerId) -> Result<Option<GatewayConfig>> {
        let row = sqlx::query_as::<_, GatewayRow>(&format!(
            "SELECT {} FROM gateway_configs WHERE owner_id = $1 AND pending_delete = 0",
            SELECT_COLUMNS
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to load gateway config");
            CredvaultError::database(e, "Failed to load gateway config")
        })?;

        Ok(row.map(GatewayConfig::from))
    }

    /// Row for the owner including one marked pending delete
    pub async fn find_including_pending(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Option<GatewayConfig>> {
        let row = sqlx::query_as::<_, GatewayRow>(&format!(
            "SELECT {} FROM gateway_configs WHERE owner_id = $1",
            SELECT_COLUMNS
        ))
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to load gateway config"))?;

        Ok(row.map(GatewayConfig::from))
    }

    /// Replace the owner's gateway config wholesale.
    ///
    /// Returns the previous vault reference when it differs from the new one
    /// (including when the new config carries no secret at all).
    #[instrument(skip(self, secret, base_endpoint), fields(has_secret = secret.is_some(), has_endpoint = base_endpoint.is_some()), name = "db_upsert_gateway")]
    pub async fn upsert(
        &self,
        owner_id: &OwnerId,
        secret: Option<GatewaySecretRef<'_>>,
        base_endpoint: Option<&str>,
    ) -> Result<Option<VaultRef>> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| CredvaultError::database(e, "Failed to begin gateway upsert"))?;

        let previous: Option<Option<String>> =
            sqlx::query_scalar("SELECT vault_ref FROM gateway_configs WHERE owner_id = $1")
                .bind(owner_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    CredvaultError::database(e, "Failed to read existing gateway config")
                })?;

        let vault_ref = secret.as_ref().map(|s| s.vault_ref.as_str());
        let fingerprint = secret.as_ref().map(|s| s.fingerprint.as_str());

        sqlx::query(
            "INSERT INTO gateway_configs (owner_id, vault_ref, fingerprint, base_endpoint, pending_delete, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, 0, $5, $5) \
             ON CONFLICT (owner_id) DO UPDATE SET \
                vault_ref = excluded.vault_ref, \
                fingerprint = excluded.fingerprint, \
                base_endpoint = excluded.base_endpoint, \
                pending_delete = 0, \
                updated_at = excluded.updated_at",
        )
        .bind(owner_id)
        .bind(vault_ref)
        .bind(fingerprint)
        .bind(base_endpoint)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to upsert gateway config");
            CredvaultError::database(e, "Failed to upsert gateway config")
        })?;

        tx.commit()
            .await
            .map_err(|e| CredvaultError::database(e, "Failed to commit gateway upsert"))?;

        Ok(previous
            .flatten()
            .filter(|prev| Some(prev.as_str()) != vault_ref)
            .map(VaultRef::from_string))
    }

    /// Hide the owner's config while it still carries `vault_ref` (`None`
    /// matches a config without a secret). Returns false if the row changed.
    pub async fn mark_pending_delete(
        &self,
        owner_id: &OwnerId,
        vault_ref: Option<&VaultRef>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE gateway_configs SET pending_delete = 1, updated_at = $1 \
             WHERE owner_id = $2 AND vault_ref IS $3",
        )
        .bind(Utc::now())
        .bind(owner_id)
        .bind(vault_ref.map(VaultRef::as_str))
        .execute(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to mark gateway config pending delete"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove the owner's row if its secret reference is still `vault_ref`
    /// (`None` matches a row without a secret).
    pub async fn remove(&self, owner_id: &OwnerId, vault_ref: Option<&VaultRef>) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM gateway_configs WHERE owner_id = $1 AND vault_ref IS $2",
        )
        .bind(owner_id)
        .bind(vault_ref.map(VaultRef::as_str))
        .execute(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to delete gateway config"))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_pending_deletes(&self, limit: i64) -> Result<Vec<GatewayConfig>> {
        let rows = sqlx::query_as::<_, GatewayRow>(&format!(
            "SELECT {} FROM gateway_configs WHERE pending_delete = 1 ORDER BY updated_at LIMIT $1",
            SELECT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to list pending gateway deletes"))?;

        Ok(rows.into_iter().map(GatewayConfig::from).collect())
    }
}
