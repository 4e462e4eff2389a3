//! # Storage and Persistence
//!
//! SQLite connectivity and the Credential Store tables: credentials, gateway
//! configs, consent flags, the orphaned-vault-entry queue and the audit log.
//!
//! Only pool setup, migrations and audit chain verification are public. The
//! row-level repositories stay inside the crate so every read or write of a
//! credential row goes through the Access Gate:
//!
//! ```compile_fail
//! use credvault::storage::CredentialRepository;
//! ```
//!
//! ```compile_fail
//! use credvault::storage::repositories::OrphanRepository;
//! ```

pub mod migrations;
pub mod pool;
pub(crate) mod repositories;

pub use crate::config::DatabaseConfig;

pub use migrations::{
    get_migration_version, list_applied_migrations, validate_migrations, MigrationInfo,
};
pub use pool::{create_pool, get_pool_stats, DbPool, PoolStats};
pub use repositories::ChainVerification;
pub(crate) use repositories::{
    AuditLogRepository, ConsentRepository, CredentialRepository, GatewayRepository,
    GatewaySecretRef, OrphanRepository,
};

use crate::errors::{CredvaultError, Result};

/// Run database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    migrations::run_migrations(pool).await
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| CredvaultError::database(e, "Database connectivity check failed"))?;

    Ok(())
}

/// In-memory database with every migration applied
#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        auto_migrate: true,
        ..Default::default()
    };
    create_pool(&config).await.expect("in-memory pool")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConsentActor, Fingerprint, OwnerId, ServiceName, VaultRef};
    use crate::secrets::SecretString;

    fn owner(id: &str) -> OwnerId {
        OwnerId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        assert!(validate_migrations(&pool).await.unwrap());
        assert_eq!(get_migration_version(&pool).await.unwrap(), 20260101000006);
        check_connection(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_credential_upsert_returns_superseded_ref() {
        let repo = CredentialRepository::new(test_pool().await);
        let u1 = owner("u1");
        let first = VaultRef::generate("t");
        let second = VaultRef::generate("t");
        let fp = Fingerprint::of(&SecretString::new("sk-1"));

        assert!(repo.upsert(&u1, ServiceName::OpenAi, &first, &fp).await.unwrap().is_none());
        let replaced = repo.upsert(&u1, ServiceName::OpenAi, &second, &fp).await.unwrap();
        assert_eq!(replaced, Some(first));

        let records = repo.list_for_owner(&u1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vault_ref, second);
    }

    #[tokio::test]
    async fn test_pending_delete_hides_credential() {
        let repo = CredentialRepository::new(test_pool().await);
        let u1 = owner("u1");
        let vault_ref = VaultRef::generate("t");
        let fp = Fingerprint::of(&SecretString::new("sk-1"));
        repo.upsert(&u1, ServiceName::Mistral, &vault_ref, &fp).await.unwrap();

        assert!(repo.mark_pending_delete(&u1, ServiceName::Mistral, &vault_ref).await.unwrap());

        assert!(repo.find(&u1, ServiceName::Mistral).await.unwrap().is_none());
        assert!(!repo.touch(&u1, ServiceName::Mistral).await.unwrap());
        assert_eq!(repo.list_pending_deletes(10).await.unwrap().len(), 1);

        assert!(repo.remove(&u1, ServiceName::Mistral, &vault_ref).await.unwrap());
        assert!(repo.find_vault_ref(&u1, ServiceName::Mistral).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pending_delete_skips_row_replaced_since_read() {
        let repo = CredentialRepository::new(test_pool().await);
        let u1 = owner("u1");
        let read_ref = VaultRef::generate("t");
        let newer_ref = VaultRef::generate("t");
        let fp = Fingerprint::of(&SecretString::new("sk-1"));

        repo.upsert(&u1, ServiceName::OpenAi, &read_ref, &fp).await.unwrap();
        let seen = repo.find_vault_ref(&u1, ServiceName::OpenAi).await.unwrap().unwrap();
        repo.upsert(&u1, ServiceName::OpenAi, &newer_ref, &fp).await.unwrap();

        assert!(!repo.mark_pending_delete(&u1, ServiceName::OpenAi, &seen).await.unwrap());
        assert!(!repo.remove(&u1, ServiceName::OpenAi, &seen).await.unwrap());

        let live = repo.find(&u1, ServiceName::OpenAi).await.unwrap().unwrap();
        assert_eq!(live.vault_ref, newer_ref);
        assert!(repo.list_pending_deletes(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_pending_delete_skips_replaced_config() {
        let repo = GatewayRepository::new(test_pool().await);
        let u1 = owner("u1");
        let read_ref = VaultRef::generate("t");
        let newer_ref = VaultRef::generate("t");
        let fp = Fingerprint::of(&SecretString::new("gw-key"));

        repo.upsert(&u1, Some(GatewaySecretRef { vault_ref: &read_ref, fingerprint: &fp }), None)
            .await
            .unwrap();
        let seen = repo.find_including_pending(&u1).await.unwrap().unwrap().vault_ref;
        repo.upsert(&u1, Some(GatewaySecretRef { vault_ref: &newer_ref, fingerprint: &fp }), None)
            .await
            .unwrap();

        assert!(!repo.mark_pending_delete(&u1, seen.as_ref()).await.unwrap());
        assert_eq!(repo.find(&u1).await.unwrap().unwrap().vault_ref, Some(newer_ref.clone()));

        repo.upsert(&u1, None, Some("https://gw.example/v1")).await.unwrap();
        assert!(!repo.mark_pending_delete(&u1, Some(&newer_ref)).await.unwrap());
        assert!(repo.mark_pending_delete(&u1, None).await.unwrap());
        assert!(repo.find(&u1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gateway_check_constraint() {
        let repo = GatewayRepository::new(test_pool().await);
        let result = repo.upsert(&owner("u1"), None, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_gateway_endpoint_only_replaces_secret() {
        let repo = GatewayRepository::new(test_pool().await);
        let u1 = owner("u1");
        let vault_ref = VaultRef::generate("t");
        let fp = Fingerprint::of(&SecretString::new("gw-key"));

        repo.upsert(
            &u1,
            Some(GatewaySecretRef { vault_ref: &vault_ref, fingerprint: &fp }),
            Some("https://gw.example/v1"),
        )
        .await
        .unwrap();

        let replaced = repo.upsert(&u1, None, Some("https://gw2.example/v1")).await.unwrap();
        assert_eq!(replaced, Some(vault_ref));

        let config = repo.find(&u1).await.unwrap().unwrap();
        assert!(!config.has_secret());
        assert_eq!(config.base_endpoint.as_deref(), Some("https://gw2.example/v1"));
    }

    #[tokio::test]
    async fn test_consent_versioning() {
        let repo = ConsentRepository::new(test_pool().await);
        let u1 = owner("u1");

        let initial = repo.get_or_default(&u1).await.unwrap();
        assert!(initial.allow_team_fallback);
        assert_eq!(initial.version, 1);
        assert_eq!(initial.updated_by, ConsentActor::System);

        let revoked = repo.set(&u1, false, ConsentActor::Owner).await.unwrap();
        assert!(!revoked.allow_team_fallback);
        assert_eq!(revoked.version, 2);

        let unchanged = repo.set(&u1, false, ConsentActor::Operator).await.unwrap();
        assert_eq!(unchanged.version, 2);
        assert_eq!(unchanged.updated_by, ConsentActor::Owner);

        assert!(!repo.ensure_default(&u1).await.unwrap());
    }

    #[tokio::test]
    async fn test_orphan_queue() {
        let repo = OrphanRepository::new(test_pool().await);
        let vault_ref = VaultRef::generate("t");

        repo.enqueue(&vault_ref, "superseded", "vault down").await.unwrap();
        repo.enqueue(&vault_ref, "superseded", "vault still down").await.unwrap();

        let orphans = repo.list(10).await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].attempts, 2);

        repo.remove(&vault_ref).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_orphan_reference_check() {
        let pool = test_pool().await;
        let orphans = OrphanRepository::new(pool.clone());
        let credentials = CredentialRepository::new(pool);
        let used = VaultRef::generate("t");
        let unused = VaultRef::generate("t");
        let fp = Fingerprint::of(&SecretString::new("sk-1"));

        credentials.upsert(&owner("u1"), ServiceName::Google, &used, &fp).await.unwrap();
        credentials.mark_pending_delete(&owner("u1"), ServiceName::Google, &used).await.unwrap();

        assert!(orphans.is_referenced(&used).await.unwrap());
        assert!(!orphans.is_referenced(&unused).await.unwrap());
    }

    #[tokio::test]
    async fn test_audit_chain_detects_tampering() {
        use crate::audit::{AuditEvent, AuditOutcome};

        let pool = test_pool().await;
        let repo = AuditLogRepository::new(pool.clone());
        for op in ["insert_or_replace_credential", "get_credential", "delete_credential"] {
            let mut event = AuditEvent::new(op, AuditOutcome::Success);
            event.owner = Some("owner-1".to_string());
            repo.append(&event).await.unwrap();
        }

        let verification = repo.verify_chain().await.unwrap();
        assert_eq!(verification.entries, 3);
        assert!(verification.is_intact());

        sqlx::query("UPDATE audit_log SET outcome = 'forbidden' WHERE sequence = 2")
            .execute(&pool)
            .await
            .unwrap();

        let verification = repo.verify_chain().await.unwrap();
        assert_eq!(verification.broken_at, Some(2));
    }
}
