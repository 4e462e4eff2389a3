//! Audit log repository with a tamper-evident hash chain
//!
//! Each row stores the hash of its predecessor and a SHA-256 over its own
//! fields plus that predecessor hash. Editing, deleting or reordering any row
//! breaks verification from that row onwards.

use crate::audit::AuditEvent;
use crate::errors::{CredvaultError, Result};
use crate::storage::DbPool;
use chrono::SecondsFormat;
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

const FIELD_SEPARATOR: u8 = 0x1f;

/// Persisted audit row
#[derive(Debug, Clone, FromRow)]
pub struct StoredAuditEntry {
    pub sequence: i64,
    pub owner: Option<String>,
    pub operation: String,
    pub outcome: String,
    pub tier: Option<String>,
    pub reason: Option<String>,
    pub actor: Option<String>,
    pub fingerprint_prefix: Option<String>,
    pub occurred_at: String,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// Result of walking the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    pub entries: u64,
    /// Sequence number of the first row whose hash or link does not verify
    pub broken_at: Option<i64>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

struct HashInput<'a> {
    owner: Option<&'a str>,
    operation: &'a str,
    outcome: &'a str,
    tier: Option<&'a str>,
    reason: Option<&'a str>,
    actor: Option<&'a str>,
    fingerprint_prefix: Option<&'a str>,
    occurred_at: &'a str,
}

fn compute_entry_hash(previous_hash: Option<&str>, input: &HashInput<'_>) -> String {
    let mut hasher = Sha256::new();
    for field in [
        previous_hash,
        input.owner,
        Some(input.operation),
        Some(input.outcome),
        input.tier,
        input.reason,
        input.actor,
        input.fingerprint_prefix,
        Some(input.occurred_at),
    ] {
        // Absent and empty fields hash differently
        match field {
            Some(value) => {
                hasher.update([1u8]);
                hasher.update(value.as_bytes());
            }
            None => hasher.update([0u8]),
        }
        hasher.update([FIELD_SEPARATOR]);
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: DbPool,
    append_lock: Arc<Mutex<()>>,
}

impl AuditLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, append_lock: Arc::new(Mutex::new(())) }
    }

    /// Append an event to the chain, returning its sequence number
    #[instrument(skip_all, fields(operation = event.operation, outcome = %event.outcome), name = "db_append_audit")]
    pub async fn append(&self, event: &AuditEvent) -> Result<i64> {
        let occurred_at = event.occurred_at.to_rfc3339_opts(SecondsFormat::Micros, true);
        let input = HashInput {
            owner: event.owner.as_deref(),
            operation: event.operation,
            outcome: event.outcome.as_str(),
            tier: event.tier.map(|t| t.as_str()),
            reason: event.reason.map(|r| r.as_str()),
            actor: event.actor.map(|a| a.as_str()),
            fingerprint_prefix: event.fingerprint_prefix.as_deref(),
            occurred_at: &occurred_at,
        };

        let _guard = self.append_lock.lock().await;
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| CredvaultError::database(e, "Failed to begin audit append"))?;

        let previous_hash: Option<String> =
            sqlx::query_scalar("SELECT entry_hash FROM audit_log ORDER BY sequence DESC LIMIT 1")
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| CredvaultError::database(e, "Failed to read audit chain head"))?;

        let entry_hash = compute_entry_hash(previous_hash.as_deref(), &input);

        let sequence: i64 = sqlx::query_scalar(
            "INSERT INTO audit_log (owner, operation, outcome, tier, reason, actor, fingerprint_prefix, occurred_at, previous_hash, entry_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING sequence",
        )
        .bind(input.owner)
        .bind(input.operation)
        .bind(input.outcome)
        .bind(input.tier)
        .bind(input.reason)
        .bind(input.actor)
        .bind(input.fingerprint_prefix)
        .bind(&occurred_at)
        .bind(previous_hash.as_deref())
        .bind(&entry_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to write audit event"))?;

        tx.commit()
            .await
            .map_err(|e| CredvaultError::database(e, "Failed to commit audit event"))?;

        Ok(sequence)
    }

    /// Walk the whole chain in sequence order
    #[instrument(skip(self), name = "db_verify_audit_chain")]
    pub async fn verify_chain(&self) -> Result<ChainVerification> {
        let entries = sqlx::query_as::<_, StoredAuditEntry>(
            "SELECT sequence, owner, operation, outcome, tier, reason, actor, fingerprint_prefix, occurred_at, previous_hash, entry_hash \
             FROM audit_log ORDER BY sequence ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Failed to read audit chain"))?;

        let mut prev_hash: Option<String> = None;
        for entry in &entries {
            let expected = compute_entry_hash(
                prev_hash.as_deref(),
                &HashInput {
                    owner: entry.owner.as_deref(),
                    operation: &entry.operation,
                    outcome: &entry.outcome,
                    tier: entry.tier.as_deref(),
                    reason: entry.reason.as_deref(),
                    actor: entry.actor.as_deref(),
                    fingerprint_prefix: entry.fingerprint_prefix.as_deref(),
                    occurred_at: &entry.occurred_at,
                },
            );

            if entry.previous_hash != prev_hash || entry.entry_hash != expected {
                warn!(sequence = entry.sequence, "Audit chain verification failed");
                return Ok(ChainVerification {
                    entries: entries.len() as u64,
                    broken_at: Some(entry.sequence),
                });
            }
            prev_hash = Some(entry.entry_hash.clone());
        }

        Ok(ChainVerification { entries: entries.len() as u64, broken_at: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(operation: &'a str, occurred_at: &'a str) -> HashInput<'a> {
        HashInput {
            owner: Some("owner-1"),
            operation,
            outcome: "success",
            tier: None,
            reason: None,
            actor: None,
            fingerprint_prefix: None,
            occurred_at,
        }
    }

    #[test]
    fn test_hash_depends_on_predecessor() {
        let i = input("get_credential", "2026-01-01T00:00:00.000000Z");
        assert_ne!(compute_entry_hash(None, &i), compute_entry_hash(Some("abc"), &i));
    }

    #[test]
    fn test_absent_and_empty_fields_differ() {
        let mut a = input("touch_credential", "2026-01-01T00:00:00.000000Z");
        let b = HashInput {
            tier: Some(""),
            ..input("touch_credential", "2026-01-01T00:00:00.000000Z")
        };
        a.tier = None;
        assert_ne!(compute_entry_hash(None, &a), compute_entry_hash(None, &b));
    }
}
