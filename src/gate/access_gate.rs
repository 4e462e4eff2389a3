//! # Access Gate
//!
//! The only component holding a [`SecretVault`] handle and the Credential
//! Store repositories. Every operation verifies the execution context, runs
//! each vault and store call under a deadline, and never retries internally.
//!
//! ## Replacement and deletion
//!
//! An upsert stores the new secret first, then points the row at it. The
//! superseded vault entry is deleted after the row commits; if that delete
//! fails the entry is queued in `vault_orphans`.
//!
//! A delete marks the row `pending_delete` (hiding it from every read),
//! deletes the vault entry, then removes the row. The mark only applies
//! while the row still holds the reference the delete read; otherwise the
//! delete re-reads. An interruption at any step leaves a hidden row that
//! [`AccessGate::reconcile_pending_deletes`] finishes.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn, Instrument};

use super::client::{CredentialGate, ReconcileReport};
use super::context::{ExecutionContext, Principal, TrustVerifier};
use crate::config::GateConfig;
use crate::domain::{
    normalize_endpoint, ConsentActor, ConsentFlag, CredentialRecord, CredentialSummary,
    Fingerprint, GatewayConfig, OwnerId, ServiceName, VaultRef,
};
use crate::errors::{CredvaultError, Result};
use crate::observability::{MetricsRecorder, SECURITY_TARGET};
use crate::secrets::{SecretString, SecretVault};
use crate::storage::{
    ConsentRepository, CredentialRepository, DbPool, GatewayRepository, GatewaySecretRef,
    OrphanRepository,
};

/// Re-reads allowed when a concurrent upsert swaps the row being deleted
const DELETE_ATTEMPTS: usize = 3;

pub struct AccessGate {
    credentials: CredentialRepository,
    gateways: GatewayRepository,
    consent: ConsentRepository,
    orphans: OrphanRepository,
    vault: Arc<dyn SecretVault>,
    verifier: TrustVerifier,
    operation_timeout: Duration,
    reconcile_batch_size: i64,
    metrics: MetricsRecorder,
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("vault", &self.vault.backend_type())
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl AccessGate {
    pub fn new(pool: DbPool, vault: Arc<dyn SecretVault>, config: &GateConfig) -> Self {
        Self {
            credentials: CredentialRepository::new(pool.clone()),
            gateways: GatewayRepository::new(pool.clone()),
            consent: ConsentRepository::new(pool.clone()),
            orphans: OrphanRepository::new(pool),
            vault,
            verifier: TrustVerifier::new(&config.service_role_key),
            operation_timeout: config.operation_timeout(),
            reconcile_batch_size: config.reconcile_batch_size,
            metrics: MetricsRecorder::disabled(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = metrics;
        self
    }

    /// Reject anything but the trusted execution context
    fn authorize(&self, ctx: &ExecutionContext, operation: &'static str) -> Result<()> {
        if self.verifier.is_trusted(ctx) {
            return Ok(());
        }
        warn!(
            target: SECURITY_TARGET,
            operation,
            context = ctx.kind(),
            "Rejected gate call from untrusted execution context"
        );
        self.metrics.record_security_event(operation);
        Err(CredvaultError::forbidden(operation))
    }

    /// Run one vault or store call under the context's deadline
    async fn bounded<T, F>(
        &self,
        ctx: &ExecutionContext,
        operation: &'static str,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        let deadline = ctx.timeout().unwrap_or(self.operation_timeout);
        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                let duration_ms = deadline.as_millis() as u64;
                warn!(operation, duration_ms, "Gate call exceeded its deadline");
                Err(CredvaultError::timeout(operation, duration_ms))
            }
        }
    }

    /// Time an operation and record it
    async fn observed<T, F>(&self, operation: &'static str, body: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        let start = Instant::now();
        let result = body.instrument(crate::gate_span!(operation)).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => match e.kind() {
                crate::errors::ErrorKind::NotFound => "not_found",
                crate::errors::ErrorKind::Forbidden => "forbidden",
                crate::errors::ErrorKind::Unavailable => "unavailable",
                crate::errors::ErrorKind::ConstraintViolation => "rejected",
            },
        };
        self.metrics.record_gate_operation(operation, outcome, start.elapsed().as_secs_f64());
        result
    }

    fn validate_secret(secret: &SecretString) -> Result<()> {
        if secret.is_blank() {
            return Err(CredvaultError::constraint("secret cannot be empty"));
        }
        Ok(())
    }

    /// Retrieve the plaintext behind a live row's reference.
    ///
    /// A vault miss while the row still points at the same reference is a
    /// consistency failure, not an absent credential.
    async fn retrieve_for_row<F>(
        &self,
        ctx: &ExecutionContext,
        vault_ref: &VaultRef,
        still_current: F,
    ) -> Result<SecretString>
    where
        F: Future<Output = Result<Option<VaultRef>>> + Send,
    {
        match self.bounded(ctx, "vault.retrieve", self.vault.retrieve(vault_ref)).await {
            Err(e) if e.is_not_found() => {
                let current = self.bounded(ctx, "store.recheck_reference", still_current).await?;
                if current.as_ref() == Some(vault_ref) {
                    error!(vault_ref = %vault_ref, "Live record points at a missing vault entry");
                    return Err(CredvaultError::internal("Vault entry missing for live record"));
                }
                Err(e)
            }
            other => other,
        }
    }

    /// Best-effort removal of a vault entry no row should reference any more
    async fn discard_vault_entry(
        &self,
        ctx: &ExecutionContext,
        vault_ref: &VaultRef,
        reason: &str,
    ) {
        match self.bounded(ctx, "vault.delete", self.vault.delete(vault_ref)).await {
            Ok(()) => debug!(vault_ref = %vault_ref, reason, "Discarded vault entry"),
            Err(e) => {
                warn!(
                    vault_ref = %vault_ref,
                    reason,
                    error = %e,
                    "Vault delete failed, queuing orphan"
                );
                self.queue_orphan(vault_ref, reason, &e).await;
            }
        }
    }

    /// Clean up a freshly stored entry after the row write failed. The write
    /// may still have landed if it timed out mid-commit.
    async fn abandon_new_entry(&self, ctx: &ExecutionContext, vault_ref: &VaultRef) {
        let referenced =
            self.bounded(ctx, "store.check_reference", self.orphans.is_referenced(vault_ref)).await;
        match referenced {
            Ok(true) => {
                warn!(
                    vault_ref = %vault_ref,
                    "Row write reported failure but references the new entry"
                );
            }
            Ok(false) => self.discard_vault_entry(ctx, vault_ref, "abandoned_upsert").await,
            Err(e) => self.queue_orphan(vault_ref, "abandoned_upsert", &e).await,
        }
    }

    async fn queue_orphan(&self, vault_ref: &VaultRef, reason: &str, cause: &CredvaultError) {
        if let Err(e) = self.orphans.enqueue(vault_ref, reason, &cause.to_string()).await {
            error!(
                vault_ref = %vault_ref,
                reason,
                error = %e,
                "Failed to queue orphaned vault entry"
            );
        }
    }

    async fn reconcile_credentials(
        &self,
        ctx: &ExecutionContext,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let pending = self
            .bounded(
                ctx,
                "store.list_pending_credentials",
                self.credentials.list_pending_deletes(self.reconcile_batch_size),
            )
            .await?;

        for item in pending {
            let finished = async {
                self.bounded(ctx, "vault.delete", self.vault.delete(&item.vault_ref)).await?;
                self.bounded(
                    ctx,
                    "store.remove_credential",
                    self.credentials.remove(&item.owner_id, item.service, &item.vault_ref),
                )
                .await
            }
            .await;

            match finished {
                Ok(_) => report.credentials_removed += 1,
                Err(e) => {
                    warn!(
                        service = %item.service,
                        error = %e,
                        "Pending credential delete still failing"
                    );
                    report.failures += 1;
                }
            }
        }
        Ok(())
    }

    async fn reconcile_gateways(
        &self,
        ctx: &ExecutionContext,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let pending = self
            .bounded(
                ctx,
                "store.list_pending_gateways",
                self.gateways.list_pending_deletes(self.reconcile_batch_size),
            )
            .await?;

        for config in pending {
            let finished = async {
                if let Some(vault_ref) = &config.vault_ref {
                    self.bounded(ctx, "vault.delete", self.vault.delete(vault_ref)).await?;
                }
                self.bounded(
                    ctx,
                    "store.remove_gateway",
                    self.gateways.remove(&config.owner_id, config.vault_ref.as_ref()),
                )
                .await
            }
            .await;

            match finished {
                Ok(_) => report.gateways_removed += 1,
                Err(e) => {
                    warn!(error = %e, "Pending gateway delete still failing");
                    report.failures += 1;
                }
            }
        }
        Ok(())
    }

    async fn reconcile_orphans(
        &self,
        ctx: &ExecutionContext,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let orphans = self
            .bounded(ctx, "store.list_orphans", self.orphans.list(self.reconcile_batch_size))
            .await?;

        for orphan in orphans {
            let finished = async {
                let referenced = self
                    .bounded(
                        ctx,
                        "store.check_reference",
                        self.orphans.is_referenced(&orphan.vault_ref),
                    )
                    .await?;
                if !referenced {
                    self.bounded(ctx, "vault.delete", self.vault.delete(&orphan.vault_ref)).await?;
                }
                self.bounded(ctx, "store.remove_orphan", self.orphans.remove(&orphan.vault_ref))
                    .await
            }
            .await;

            match finished {
                Ok(()) => report.orphans_cleared += 1,
                Err(e) => {
                    warn!(
                        vault_ref = %orphan.vault_ref,
                        attempts = orphan.attempts,
                        error = %e,
                        "Orphaned vault entry still present"
                    );
                    self.queue_orphan(&orphan.vault_ref, &orphan.reason, &e).await;
                    report.failures += 1;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialGate for AccessGate {
    #[instrument(skip(self, ctx, owner_id, secret), fields(service = %service))]
    async fn insert_or_replace_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
        secret: SecretString,
    ) -> Result<Fingerprint> {
        self.observed("insert_or_replace_credential", async {
            self.authorize(ctx, "insert_or_replace_credential")?;
            if service.is_gateway() {
                return Err(CredvaultError::constraint(
                    "gateway secrets are managed through the gateway config",
                ));
            }
            Self::validate_secret(&secret)?;

            let fingerprint = Fingerprint::of(&secret);
            let vault_ref = self.bounded(ctx, "vault.store", self.vault.store(&secret)).await?;

            let superseded = match self
                .bounded(
                    ctx,
                    "store.upsert_credential",
                    self.credentials.upsert(owner_id, service, &vault_ref, &fingerprint),
                )
                .await
            {
                Ok(previous) => previous,
                Err(e) => {
                    self.abandon_new_entry(ctx, &vault_ref).await;
                    return Err(e);
                }
            };

            if let Some(previous) = superseded {
                self.discard_vault_entry(ctx, &previous, "superseded").await;
            }

            info!(
                service = %service,
                fingerprint = fingerprint.display_prefix(),
                "Credential saved"
            );
            Ok(fingerprint)
        })
        .await
    }

    #[instrument(skip(self, ctx, owner_id), fields(service = %service))]
    async fn get_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<SecretString> {
        self.observed("get_credential", async {
            self.authorize(ctx, "get_credential")?;

            let record = self
                .bounded(ctx, "store.find_credential", self.credentials.find(owner_id, service))
                .await?
                .ok_or_else(|| CredvaultError::not_found("credential", service.as_str()))?;

            let current = async {
                self.credentials.find(owner_id, service).await.map(|r| r.map(|r| r.vault_ref))
            };
            self.retrieve_for_row(ctx, &record.vault_ref, current).await
        })
        .await
    }

    #[instrument(skip(self, ctx, owner_id), fields(service = %service))]
    async fn touch_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<()> {
        self.observed("touch_credential", async {
            self.authorize(ctx, "touch_credential")?;

            let touched = self
                .bounded(ctx, "store.touch_credential", self.credentials.touch(owner_id, service))
                .await?;
            if !touched {
                return Err(CredvaultError::not_found("credential", service.as_str()));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx, owner_id), fields(service = %service))]
    async fn delete_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<()> {
        self.observed("delete_credential", async {
            self.authorize(ctx, "delete_credential")?;

            for _ in 0..DELETE_ATTEMPTS {
                let Some(vault_ref) = self
                    .bounded(
                        ctx,
                        "store.find_vault_ref",
                        self.credentials.find_vault_ref(owner_id, service),
                    )
                    .await?
                else {
                    debug!(service = %service, "Delete of absent credential");
                    return Ok(());
                };

                let marked = self
                    .bounded(
                        ctx,
                        "store.mark_pending_delete",
                        self.credentials.mark_pending_delete(owner_id, service, &vault_ref),
                    )
                    .await?;
                if !marked {
                    debug!(service = %service, "Credential replaced during delete, re-reading");
                    continue;
                }

                self.bounded(ctx, "vault.delete", self.vault.delete(&vault_ref)).await?;
                self.bounded(
                    ctx,
                    "store.remove_credential",
                    self.credentials.remove(owner_id, service, &vault_ref),
                )
                .await?;

                info!(service = %service, "Credential removed");
                return Ok(());
            }

            warn!(
                service = %service,
                attempts = DELETE_ATTEMPTS,
                "Credential kept changing during delete"
            );
            Err(CredvaultError::unavailable(
                "delete_credential",
                "credential is being replaced concurrently",
            ))
        })
        .await
    }

    #[instrument(
        skip(self, ctx, owner_id, base_endpoint, secret),
        fields(has_endpoint = base_endpoint.is_some(), has_secret = secret.is_some())
    )]
    async fn upsert_gateway_config(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        base_endpoint: Option<String>,
        secret: Option<SecretString>,
    ) -> Result<()> {
        self.observed("upsert_gateway_config", async {
            self.authorize(ctx, "upsert_gateway_config")?;

            if base_endpoint.is_none() && secret.is_none() {
                return Err(CredvaultError::constraint(
                    "gateway config requires a base endpoint or a secret",
                ));
            }
            let endpoint = base_endpoint
                .as_deref()
                .map(normalize_endpoint)
                .transpose()
                .map_err(|e| CredvaultError::constraint(format!("invalid base endpoint: {}", e)))?;
            if let Some(secret) = &secret {
                Self::validate_secret(secret)?;
            }

            let stored = match &secret {
                Some(secret) => {
                    let vault_ref =
                        self.bounded(ctx, "vault.store", self.vault.store(secret)).await?;
                    Some((vault_ref, Fingerprint::of(secret)))
                }
                None => None,
            };

            let secret_ref = stored
                .as_ref()
                .map(|(vault_ref, fingerprint)| GatewaySecretRef { vault_ref, fingerprint });
            let superseded = match self
                .bounded(
                    ctx,
                    "store.upsert_gateway",
                    self.gateways.upsert(owner_id, secret_ref, endpoint.as_deref()),
                )
                .await
            {
                Ok(previous) => previous,
                Err(e) => {
                    if let Some((vault_ref, _)) = &stored {
                        self.abandon_new_entry(ctx, vault_ref).await;
                    }
                    return Err(e);
                }
            };

            if let Some(previous) = superseded {
                self.discard_vault_entry(ctx, &previous, "superseded").await;
            }

            info!(
                has_secret = stored.is_some(),
                has_endpoint = endpoint.is_some(),
                "Gateway config saved"
            );
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, ctx, owner_id))]
    async fn delete_gateway_config(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<()> {
        self.observed("delete_gateway_config", async {
            self.authorize(ctx, "delete_gateway_config")?;

            for _ in 0..DELETE_ATTEMPTS {
                let Some(config) = self
                    .bounded(
                        ctx,
                        "store.find_gateway",
                        self.gateways.find_including_pending(owner_id),
                    )
                    .await?
                else {
                    return Ok(());
                };
                let vault_ref = config.vault_ref.as_ref();

                let marked = self
                    .bounded(
                        ctx,
                        "store.mark_pending_delete",
                        self.gateways.mark_pending_delete(owner_id, vault_ref),
                    )
                    .await?;
                if !marked {
                    debug!("Gateway config replaced during delete, re-reading");
                    continue;
                }

                if let Some(vault_ref) = vault_ref {
                    self.bounded(ctx, "vault.delete", self.vault.delete(vault_ref)).await?;
                }
                self.bounded(ctx, "store.remove_gateway", self.gateways.remove(owner_id, vault_ref))
                    .await?;

                info!("Gateway config removed");
                return Ok(());
            }

            warn!(attempts = DELETE_ATTEMPTS, "Gateway config kept changing during delete");
            Err(CredvaultError::unavailable(
                "delete_gateway_config",
                "gateway config is being replaced concurrently",
            ))
        })
        .await
    }

    #[instrument(skip(self, ctx, owner_id))]
    async fn get_gateway_base_endpoint(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<String> {
        self.observed("get_gateway_base_endpoint", async {
            self.authorize(ctx, "get_gateway_base_endpoint")?;

            self.bounded(ctx, "store.find_gateway", self.gateways.find(owner_id))
                .await?
                .and_then(|config| config.base_endpoint)
                .ok_or_else(|| CredvaultError::not_found("gateway_endpoint", "owner"))
        })
        .await
    }

    #[instrument(skip(self, ctx, owner_id))]
    async fn get_gateway_secret(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<SecretString> {
        self.observed("get_gateway_secret", async {
            self.authorize(ctx, "get_gateway_secret")?;

            let vault_ref = self
                .bounded(ctx, "store.find_gateway", self.gateways.find(owner_id))
                .await?
                .and_then(|config| config.vault_ref)
                .ok_or_else(|| CredvaultError::not_found("gateway_secret", "owner"))?;

            let current =
                async { self.gateways.find(owner_id).await.map(|c| c.and_then(|c| c.vault_ref)) };
            self.retrieve_for_row(ctx, &vault_ref, current).await
        })
        .await
    }

    #[instrument(skip(self, ctx, owner_id))]
    async fn get_consent(&self, ctx: &ExecutionContext, owner_id: &OwnerId) -> Result<ConsentFlag> {
        self.observed("get_consent", async {
            self.authorize(ctx, "get_consent")?;
            self.bounded(ctx, "store.get_consent", self.consent.get_or_default(owner_id)).await
        })
        .await
    }

    #[instrument(skip(self, ctx, owner_id), fields(actor = actor.as_str()))]
    async fn set_consent(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        allow_team_fallback: bool,
        actor: ConsentActor,
    ) -> Result<ConsentFlag> {
        self.observed("set_consent", async {
            self.authorize(ctx, "set_consent")?;
            if actor == ConsentActor::System {
                return Err(CredvaultError::constraint(
                    "consent changes must come from the owner or an operator",
                ));
            }

            let flag = self
                .bounded(
                    ctx,
                    "store.set_consent",
                    self.consent.set(owner_id, allow_team_fallback, actor),
                )
                .await?;
            info!(allow_team_fallback, version = flag.version, "Consent recorded");
            Ok(flag)
        })
        .await
    }

    #[instrument(skip(self, ctx, owner_id))]
    async fn register_owner(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<ConsentFlag> {
        self.observed("register_owner", async {
            self.authorize(ctx, "register_owner")?;
            self.bounded(ctx, "store.get_consent", self.consent.get_or_default(owner_id)).await
        })
        .await
    }

    #[instrument(skip(self, ctx, owner_id), fields(service = %service))]
    async fn lookup_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<CredentialRecord> {
        self.observed("lookup_credential", async {
            self.authorize(ctx, "lookup_credential")?;
            self.bounded(ctx, "store.find_credential", self.credentials.find(owner_id, service))
                .await?
                .ok_or_else(|| CredvaultError::not_found("credential", service.as_str()))
        })
        .await
    }

    #[instrument(skip(self, ctx, owner_id))]
    async fn lookup_gateway(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<GatewayConfig> {
        self.observed("lookup_gateway", async {
            self.authorize(ctx, "lookup_gateway")?;
            self.bounded(ctx, "store.find_gateway", self.gateways.find(owner_id))
                .await?
                .ok_or_else(|| CredvaultError::not_found("gateway_config", "owner"))
        })
        .await
    }

    #[instrument(skip(self, ctx, owner_id))]
    async fn list_credentials(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<Vec<CredentialSummary>> {
        self.observed("list_credentials", async {
            let own_listing = matches!(ctx.principal(), Principal::User(user) if user == owner_id);
            if !own_listing {
                self.authorize(ctx, "list_credentials")?;
            }

            let records = self
                .bounded(ctx, "store.list_credentials", self.credentials.list_for_owner(owner_id))
                .await?;
            Ok(records.iter().map(CredentialSummary::from).collect())
        })
        .await
    }

    #[instrument(skip(self, ctx))]
    async fn reconcile_pending_deletes(&self, ctx: &ExecutionContext) -> Result<ReconcileReport> {
        self.observed("reconcile_pending_deletes", async {
            self.authorize(ctx, "reconcile_pending_deletes")?;

            let mut report = ReconcileReport::default();
            self.reconcile_credentials(ctx, &mut report).await?;
            self.reconcile_gateways(ctx, &mut report).await?;
            self.reconcile_orphans(ctx, &mut report).await?;

            self.metrics.record_reconciled("credential", report.credentials_removed);
            self.metrics.record_reconciled("gateway", report.gateways_removed);
            self.metrics.record_reconciled("orphan", report.orphans_cleared);
            info!(
                credentials = report.credentials_removed,
                gateways = report.gateways_removed,
                orphans = report.orphans_cleared,
                failures = report.failures,
                "Reconciliation sweep finished"
            );
            Ok(report)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::MemoryVault;
    use tracing_test::traced_test;

    const KEY: &str = "service-role-key-0123456789abcdef";

    async fn gate() -> (AccessGate, MemoryVault) {
        let vault = MemoryVault::new();
        let config = GateConfig { service_role_key: SecretString::new(KEY), ..Default::default() };
        let gate =
            AccessGate::new(crate::storage::test_pool().await, Arc::new(vault.clone()), &config);
        (gate, vault)
    }

    fn trusted() -> ExecutionContext {
        ExecutionContext::service_role(SecretString::new(KEY))
    }

    fn owner(id: &str) -> OwnerId {
        OwnerId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn test_replacement_deletes_superseded_entry() {
        let (gate, vault) = gate().await;
        let u1 = owner("u1");

        gate.insert_or_replace_credential(&trusted(), &u1, ServiceName::OpenAi, "sk-1".into())
            .await
            .unwrap();
        gate.insert_or_replace_credential(&trusted(), &u1, ServiceName::OpenAi, "sk-2".into())
            .await
            .unwrap();

        assert_eq!(vault.len(), 1);
        let secret = gate.get_credential(&trusted(), &u1, ServiceName::OpenAi).await.unwrap();
        assert_eq!(secret.expose_secret(), "sk-2");
    }

    #[tokio::test]
    async fn test_gateway_service_rejected_for_direct_credentials() {
        let (gate, _) = gate().await;
        let err = gate
            .insert_or_replace_credential(
                &trusted(),
                &owner("u1"),
                ServiceName::Gateway,
                "k".into(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CredvaultError::ConstraintViolation { .. }));
    }

    #[tokio::test]
    async fn test_blank_secret_rejected() {
        let (gate, vault) = gate().await;
        let err = gate
            .insert_or_replace_credential(
                &trusted(),
                &owner("u1"),
                ServiceName::Mistral,
                "   ".into(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CredvaultError::ConstraintViolation { .. }));
        assert!(vault.is_empty());
    }

    #[tokio::test]
    async fn test_dangling_reference_is_not_reported_as_missing() {
        let (gate, vault) = gate().await;
        let u1 = owner("u1");
        gate.insert_or_replace_credential(&trusted(), &u1, ServiceName::Google, "g-1".into())
            .await
            .unwrap();

        let record = gate.lookup_credential(&trusted(), &u1, ServiceName::Google).await.unwrap();
        vault.delete(&record.vault_ref).await.unwrap();

        let err = gate.get_credential(&trusted(), &u1, ServiceName::Google).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_user_can_list_only_own_credentials() {
        let (gate, _) = gate().await;
        let u1 = owner("u1");
        gate.insert_or_replace_credential(&trusted(), &u1, ServiceName::Anthropic, "sk-a".into())
            .await
            .unwrap();

        let listed = gate.list_credentials(&ExecutionContext::user(u1.clone()), &u1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].service, ServiceName::Anthropic);

        let err = gate
            .list_credentials(&ExecutionContext::user(owner("u2")), &u1)
            .await
            .unwrap_err();
        assert!(err.is_forbidden());
    }

    #[tokio::test]
    async fn test_system_actor_cannot_set_consent() {
        let (gate, _) = gate().await;
        let err = gate
            .set_consent(&trusted(), &owner("u1"), false, ConsentActor::System)
            .await
            .unwrap_err();
        assert!(matches!(err, CredvaultError::ConstraintViolation { .. }));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_untrusted_call_is_logged_as_security_event() {
        let (gate, _) = gate().await;
        let err = gate
            .get_consent(&ExecutionContext::anonymous(), &owner("u1"))
            .await
            .unwrap_err();

        assert!(err.is_forbidden());
        assert!(logs_contain("Rejected gate call from untrusted execution context"));
        assert!(logs_contain("anonymous"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_lifecycle_logs_never_carry_secret_or_reference() {
        let (gate, _) = gate().await;
        let u1 = owner("u1");
        let secret = "sk-lifecycle-secret-0001";

        gate.insert_or_replace_credential(&trusted(), &u1, ServiceName::OpenAi, secret.into())
            .await
            .unwrap();
        let vault_ref =
            gate.lookup_credential(&trusted(), &u1, ServiceName::OpenAi).await.unwrap().vault_ref;
        gate.insert_or_replace_credential(&trusted(), &u1, ServiceName::OpenAi, "sk-next".into())
            .await
            .unwrap();
        gate.get_credential(&trusted(), &u1, ServiceName::OpenAi).await.unwrap();
        gate.delete_credential(&trusted(), &u1, ServiceName::OpenAi).await.unwrap();

        assert!(logs_contain("Credential saved"));
        assert!(!logs_contain(secret));
        assert!(!logs_contain("sk-next"));
        assert!(!logs_contain(vault_ref.as_str()));
    }
}
