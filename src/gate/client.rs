//! The Access Gate operation surface.

use async_trait::async_trait;
use serde::Serialize;

use super::context::ExecutionContext;
use crate::domain::{
    ConsentActor, ConsentFlag, CredentialRecord, CredentialSummary, Fingerprint, GatewayConfig,
    OwnerId, ServiceName,
};
use crate::errors::Result;
use crate::secrets::SecretString;

/// What a reconciliation sweep cleaned up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Credential rows pending delete that were finished
    pub credentials_removed: u64,
    /// Gateway rows pending delete that were finished
    pub gateways_removed: u64,
    /// Orphaned vault entries deleted or found to be still referenced
    pub orphans_cleared: u64,
    /// Items left for the next sweep
    pub failures: u64,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Operations exposed to the trusted execution context.
///
/// Every operation checks the context first and fails with `Forbidden` for
/// anything but the service role. `list_credentials` alone also admits a
/// user context for the user's own owner ID.
///
/// # Security Considerations
///
/// - Implementations MUST NOT log secret values or full vault references
/// - Vault and store calls MUST run under the context's deadline
#[async_trait]
pub trait CredentialGate: Send + Sync {
    /// Store `secret` and point the (owner, service) record at it, replacing
    /// any previous secret. Returns the fingerprint of the new secret.
    async fn insert_or_replace_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
        secret: SecretString,
    ) -> Result<Fingerprint>;

    async fn get_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<SecretString>;

    /// Update `last_used_at` without reading the secret
    async fn touch_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<()>;

    /// Remove the record and its vault entry. Succeeds if nothing existed.
    async fn delete_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<()>;

    /// Replace the owner's gateway config. At least one of `base_endpoint`
    /// and `secret` is required.
    async fn upsert_gateway_config(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        base_endpoint: Option<String>,
        secret: Option<SecretString>,
    ) -> Result<()>;

    async fn delete_gateway_config(&self, ctx: &ExecutionContext, owner_id: &OwnerId) -> Result<()>;

    async fn get_gateway_base_endpoint(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<String>;

    async fn get_gateway_secret(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<SecretString>;

    async fn get_consent(&self, ctx: &ExecutionContext, owner_id: &OwnerId) -> Result<ConsentFlag>;

    async fn set_consent(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        allow_team_fallback: bool,
        actor: ConsentActor,
    ) -> Result<ConsentFlag>;

    /// Create the default consent row for a new owner
    async fn register_owner(&self, ctx: &ExecutionContext, owner_id: &OwnerId)
        -> Result<ConsentFlag>;

    /// Record metadata only; never touches the vault
    async fn lookup_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<CredentialRecord>;

    /// Gateway metadata only; never touches the vault
    async fn lookup_gateway(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<GatewayConfig>;

    /// Display listing of an owner's credentials
    async fn list_credentials(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<Vec<CredentialSummary>>;

    /// Finish interrupted deletes and remove orphaned vault entries
    async fn reconcile_pending_deletes(&self, ctx: &ExecutionContext) -> Result<ReconcileReport>;
}
