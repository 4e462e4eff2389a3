//! Shared harness for integration tests
#![allow(dead_code)]

pub mod test_db;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use credvault::audit::{AuditEmitter, DatabaseAuditSink, MemoryAuditSink, OwnerPseudonymizer};
use credvault::config::GateConfig;
use credvault::domain::{OwnerId, VaultRef};
use credvault::errors::{CredvaultError, Result};
use credvault::gate::{AccessGate, AuditedGate, ExecutionContext};
use credvault::resolver::{ProviderResolver, RetryPolicy, TeamFallbackCredential};
use credvault::secrets::{MemoryVault, SecretString, SecretVault, VaultBackendType};
use credvault::storage::{create_pool, DatabaseConfig, DbPool};

pub const SERVICE_ROLE_KEY: &str = "integration-service-role-key-0123456789";

pub type Gate = AuditedGate<AccessGate>;

/// In-memory vault with switchable failures
#[derive(Debug, Clone, Default)]
pub struct FlakyVault {
    inner: MemoryVault,
    fail_deletes: Arc<AtomicBool>,
    failing_reads: Arc<AtomicU32>,
    stall_stores: Arc<AtomicBool>,
}

impl FlakyVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &MemoryVault {
        &self.inner
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `count` retrievals with an unavailable error
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn stall_stores(&self, stall: bool) {
        self.stall_stores.store(stall, Ordering::SeqCst);
    }
}

#[async_trait]
impl SecretVault for FlakyVault {
    async fn store(&self, plaintext: &SecretString) -> Result<VaultRef> {
        if self.stall_stores.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        self.inner.store(plaintext).await
    }

    async fn retrieve(&self, vault_ref: &VaultRef) -> Result<SecretString> {
        let remaining = self.failing_reads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_reads.store(remaining - 1, Ordering::SeqCst);
            return Err(CredvaultError::unavailable("vault.retrieve", "injected read failure"));
        }
        self.inner.retrieve(vault_ref).await
    }

    async fn delete(&self, vault_ref: &VaultRef) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CredvaultError::unavailable("vault.delete", "injected delete failure"));
        }
        self.inner.delete(vault_ref).await
    }

    fn backend_type(&self) -> VaultBackendType {
        VaultBackendType::Memory
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Pool, vault, audit capture and gate wired the way the service wires them
pub struct Harness {
    pub pool: DbPool,
    pub vault: FlakyVault,
    pub audit: MemoryAuditSink,
    pub emitter: AuditEmitter,
    pub gate: Arc<Gate>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_gate_config(GateConfig::default()).await
    }

    pub async fn with_gate_config(config: GateConfig) -> Self {
        let audit = MemoryAuditSink::new();
        let emitter =
            AuditEmitter::new(OwnerPseudonymizer::Passthrough).with_sink(Arc::new(audit.clone()));
        Self::assemble(memory_pool().await, audit, emitter, config)
    }

    /// Harness on a file-backed pool that also persists audit events to
    /// that database's hash chain
    pub async fn file_backed(db: &test_db::TestDatabase) -> Self {
        let pool = db.open().await;
        let audit = MemoryAuditSink::new();
        let emitter = AuditEmitter::new(OwnerPseudonymizer::Passthrough)
            .with_sink(Arc::new(audit.clone()))
            .with_sink(Arc::new(DatabaseAuditSink::new(pool.clone())));
        Self::assemble(pool, audit, emitter, GateConfig::default())
    }

    fn assemble(
        pool: DbPool,
        audit: MemoryAuditSink,
        emitter: AuditEmitter,
        mut config: GateConfig,
    ) -> Self {
        config.service_role_key = SecretString::new(SERVICE_ROLE_KEY);
        let vault = FlakyVault::new();

        let access_gate = AccessGate::new(pool.clone(), Arc::new(vault.clone()), &config);
        let gate = Arc::new(AuditedGate::new(access_gate, emitter.clone()));

        Self { pool, vault, audit, emitter, gate }
    }

    /// Resolver over this harness's gate with fast retries
    pub fn resolver(&self) -> ProviderResolver<Gate> {
        ProviderResolver::new(self.gate.clone())
            .with_retry_policy(fast_retry())
            .with_audit(self.emitter.clone())
    }

    /// Resolver with an Anthropic team credential configured
    pub fn resolver_with_team(&self) -> ProviderResolver<Gate> {
        let team = TeamFallbackCredential::new(
            credvault::domain::ServiceName::Anthropic,
            SecretString::new("sk-ant-team"),
            None,
        )
        .expect("team fallback credential");
        self.resolver().with_team_fallback(Some(Arc::new(team)))
    }
}

pub async fn memory_pool() -> DbPool {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        auto_migrate: true,
        ..Default::default()
    };
    create_pool(&config).await.expect("create in-memory pool")
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    }
}

pub fn trusted() -> ExecutionContext {
    ExecutionContext::service_role(SecretString::new(SERVICE_ROLE_KEY))
}

pub fn owner(id: &str) -> OwnerId {
    OwnerId::parse(id).expect("valid owner id")
}
