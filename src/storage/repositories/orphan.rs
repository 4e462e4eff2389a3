//! Queue of vault entries that outlived their owning row.
//!
//! Entries land here when a superseded or pending-delete vault entry could
//! not be removed. Reconciliation retries them until the vault confirms.

use crate::domain::VaultRef;
use crate::errors::{CredvaultError, Result};
use crate::storage::DbPool;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
struct OrphanRow {
    pub vault_ref: String,
    pub reason: String,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VaultOrphan {
    pub vault_ref: VaultRef,
    pub reason: String,
    pub attempts: i64,
    pub created_at: DateTime<Utc>,
}

impl From<OrphanRow> for VaultOrphan {
    fn from(row: OrphanRow) -> Self {
        Self {
            vault_ref: VaultRef::from_string(row.vault_ref),
            reason: row.reason,
            attempts: row.attempts,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrphanRepository {
    pool: DbPool,
}

impl OrphanRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(&self, vault_ref: &VaultRef, reason: &str, error: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO vault_orphans (vault_ref, reason, attempts, last_error, created_at, updated_at) \
             VALUES ($1, $2, 1, $3, $4, $4) \
             ON CONFLICT (vault_ref) DO UPDATE SET \
                attempts = vault_orphans.attempts + 1, \
                last_error = excluded.last_error, \
                updated_at = excluded.updated_at",
        )
        .bind(vault_ref.as_str())
        .bind(reason)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to queue orphaned vault entry"))?;

        Ok(())
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<VaultOrphan>> {
        let rows = sqlx::query_as::<_, OrphanRow>(
            "SELECT vault_ref, reason, attempts, created_at FROM vault_orphans ORDER BY created_at LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to list orphaned vault entries"))?;

        Ok(rows.into_iter().map(VaultOrphan::from).collect())
    }

    pub async fn remove(&self, vault_ref: &VaultRef) -> Result<()> {
        sqlx::query("DELETE FROM vault_orphans WHERE vault_ref = $1")
            .bind(vault_ref.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| CredvaultError::database(e, "Failed to clear orphaned vault entry"))?;

        Ok(())
    }

    /// Whether any credential or gateway row still points at `vault_ref`,
    /// including rows pending delete
    pub async fn is_referenced(&self, vault_ref: &VaultRef) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM credentials WHERE vault_ref = $1) \
                 OR EXISTS (SELECT 1 FROM gateway_configs WHERE vault_ref = $1)",
        )
        .bind(vault_ref.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to check vault reference usage"))
    }

    #[cfg(test)]
    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM vault_orphans")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CredvaultError::database(e, "Failed to count orphaned vault entries"))
    }
}
