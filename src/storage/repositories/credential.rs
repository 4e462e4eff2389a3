//! Credential repository for per-owner direct-provider credentials
//!
//! Rows never hold secret material, only the opaque vault reference and the
//! fingerprint. Rows marked `pending_delete` are invisible to every read
//! except the reconciliation sweep.

use crate::domain::{CredentialRecord, Fingerprint, OwnerId, ServiceName, VaultRef};
use crate::errors::{CredvaultError, Result};
use crate::storage::DbPool;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

/// Database row structure for credentials
#[derive(Debug, Clone, FromRow)]
struct CredentialRow {
    pub owner_id: String,
    pub service_name: String,
    pub vault_ref: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl TryFrom<CredentialRow> for CredentialRecord {
    type Error = CredvaultError;

    fn try_from(row: CredentialRow) -> Result<Self> {
        let service = row.service_name.parse::<ServiceName>().map_err(|e| {
            CredvaultError::internal(format!("Corrupted credential row: {}", e))
        })?;

        Ok(CredentialRecord {
            owner_id: OwnerId::from_string(row.owner_id),
            service,
            vault_ref: VaultRef::from_string(row.vault_ref),
            fingerprint: Fingerprint::from_string(row.fingerprint),
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_used_at: row.last_used_at,
        })
    }
}

/// A row left in `pending_delete` by an interrupted delete
#[derive(Debug, Clone)]
pub struct PendingCredentialDelete {
    pub owner_id: OwnerId,
    pub service: ServiceName,
    pub vault_ref: VaultRef,
}

const SELECT_COLUMNS: &str =
    "owner_id, service_name, vault_ref, fingerprint, created_at, updated_at, last_used_at";

#[derive(Debug, Clone)]
pub struct CredentialRepository {
    pool: DbPool,
}

impl CredentialRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Live record for (owner, service), if any
    #[instrument(skip(self), fields(service = %service), name = "db_find_credential")]
    pub async fn find(
        &self,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<Option<CredentialRecord>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {} FROM credentials WHERE owner_id = $1 AND service_name = $2 AND pending_delete = 0",
            SELECT_COLUMNS
        ))
        .bind(owner_id)
        .bind(service.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, service = %service, "Failed to load credential");
            CredvaultError::database(e, "Failed to load credential")
        })?;

        row.map(CredentialRecord::try_from).transpose()
    }

    /// Vault reference of the row for (owner, service), pending or not
    pub async fn find_vault_ref(
        &self,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<Option<VaultRef>> {
        let vault_ref: Option<String> = sqlx::query_scalar(
            "SELECT vault_ref FROM credentials WHERE owner_id = $1 AND service_name = $2",
        )
        .bind(owner_id)
        .bind(service.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to load credential reference"))?;

        Ok(vault_ref.map(VaultRef::from_string))
    }

    /// Insert or replace the record for (owner, service).
    ///
    /// Returns the vault reference the row pointed at before, which the
    /// caller must delete from the vault once this commits.
    #[instrument(skip(self, vault_ref, fingerprint), fields(service = %service), name = "db_upsert_credential")]
    pub async fn upsert(
        &self,
        owner_id: &OwnerId,
        service: ServiceName,
        vault_ref: &VaultRef,
        fingerprint: &Fingerprint,
    ) -> Result<Option<VaultRef>> {
        let now = Utc::now();
        // Write lock before the read: a WAL snapshot cannot be upgraded once
        // another connection has committed.
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| CredvaultError::database(e, "Failed to begin credential upsert"))?;

        let previous: Option<String> = sqlx::query_scalar(
            "SELECT vault_ref FROM credentials WHERE owner_id = $1 AND service_name = $2",
        )
        .bind(owner_id)
        .bind(service.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to read existing credential"))?;

        sqlx::query(
            "INSERT INTO credentials (owner_id, service_name, vault_ref, fingerprint, pending_delete, created_at, updated_at, last_used_at) \
             VALUES ($1, $2, $3, $4, 0, $5, $5, NULL) \
             ON CONFLICT (owner_id, service_name) DO UPDATE SET \
                vault_ref = excluded.vault_ref, \
                fingerprint = excluded.fingerprint, \
                pending_delete = 0, \
                updated_at = excluded.updated_at",
        )
        .bind(owner_id)
        .bind(service.as_str())
        .bind(vault_ref.as_str())
        .bind(fingerprint.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, service = %service, "Failed to upsert credential");
            CredvaultError::database(e, "Failed to upsert credential")
        })?;

        tx.commit()
            .await
            .map_err(|e| CredvaultError::database(e, "Failed to commit credential upsert"))?;

        Ok(previous.filter(|prev| prev != vault_ref.as_str()).map(VaultRef::from_string))
    }

    /// Set `last_used_at` on a live record. Returns false if none exists.
    #[instrument(skip(self), fields(service = %service), name = "db_touch_credential")]
    pub async fn touch(&self, owner_id: &OwnerId, service: ServiceName) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE credentials SET last_used_at = $1 WHERE owner_id = $2 AND service_name = $3 AND pending_delete = 0",
        )
        .bind(Utc::now())
        .bind(owner_id)
        .bind(service.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to touch credential"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Hide the record from reads ahead of its vault entry being deleted.
    ///
    /// Only marks the row while it still points at `vault_ref`. Returns false
    /// when a concurrent upsert has already swapped the reference, in which
    /// case the caller must re-read before deleting anything.
    pub async fn mark_pending_delete(
        &self,
        owner_id: &OwnerId,
        service: ServiceName,
        vault_ref: &VaultRef,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE credentials SET pending_delete = 1, updated_at = $1 \
             WHERE owner_id = $2 AND service_name = $3 AND vault_ref = $4",
        )
        .bind(Utc::now())
        .bind(owner_id)
        .bind(service.as_str())
        .bind(vault_ref.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to mark credential pending delete"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove the row only if it still points at `vault_ref`; a concurrent
    /// upsert that installed a new reference wins.
    pub async fn remove(
        &self,
        owner_id: &OwnerId,
        service: ServiceName,
        vault_ref: &VaultRef,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM credentials WHERE owner_id = $1 AND service_name = $2 AND vault_ref = $3",
        )
        .bind(owner_id)
        .bind(service.as_str())
        .bind(vault_ref.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to delete credential"))?;

        Ok(result.rows_affected() > 0)
    }

    /// Live records for one owner, ordered by service
    #[instrument(skip(self), name = "db_list_credentials")]
    pub async fn list_for_owner(&self, owner_id: &OwnerId) -> Result<Vec<CredentialRecord>> {
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {} FROM credentials WHERE owner_id = $1 AND pending_delete = 0 ORDER BY service_name",
            SELECT_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to list credentials"))?;

        rows.into_iter().map(CredentialRecord::try_from).collect()
    }

    pub async fn list_pending_deletes(&self, limit: i64) -> Result<Vec<PendingCredentialDelete>> {
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {} FROM credentials WHERE pending_delete = 1 ORDER BY updated_at LIMIT $1",
            SELECT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to list pending credential deletes"))?;

        rows.into_iter()
            .map(|row| {
                let record = CredentialRecord::try_from(row)?;
                Ok(PendingCredentialDelete {
                    owner_id: record.owner_id,
                    service: record.service,
                    vault_ref: record.vault_ref,
                })
            })
            .collect()
    }
}
