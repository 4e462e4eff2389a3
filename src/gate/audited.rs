//! Audited gate wrapper.
//!
//! Wraps any [`CredentialGate`] and emits one audit event per operation,
//! success or failure. Events carry the operation name, the outcome, and for
//! writes the fingerprint display prefix. Secret values and vault references
//! are never part of an event.

use async_trait::async_trait;

use super::client::{CredentialGate, ReconcileReport};
use super::context::ExecutionContext;
use crate::audit::{AuditEmitter, AuditEvent};
use crate::domain::{
    ConsentActor, ConsentFlag, CredentialRecord, CredentialSummary, Fingerprint, GatewayConfig,
    OwnerId, ServiceName,
};
use crate::errors::Result;
use crate::secrets::SecretString;

pub struct AuditedGate<G: CredentialGate> {
    inner: G,
    emitter: AuditEmitter,
}

impl<G: CredentialGate> AuditedGate<G> {
    pub fn new(inner: G, emitter: AuditEmitter) -> Self {
        Self { inner, emitter }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    async fn record<T>(&self, owner_id: Option<&OwnerId>, operation: &'static str, result: &Result<T>) {
        self.emitter.emit(owner_id, AuditEvent::for_result(operation, result)).await;
    }
}

#[async_trait]
impl<G: CredentialGate> CredentialGate for AuditedGate<G> {
    async fn insert_or_replace_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
        secret: SecretString,
    ) -> Result<Fingerprint> {
        let result = self.inner.insert_or_replace_credential(ctx, owner_id, service, secret).await;
        let mut event = AuditEvent::for_result("insert_or_replace_credential", &result);
        if let Ok(fingerprint) = &result {
            event = event.with_fingerprint(fingerprint);
        }
        self.emitter.emit(Some(owner_id), event).await;
        result
    }

    async fn get_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<SecretString> {
        let result = self.inner.get_credential(ctx, owner_id, service).await;
        self.record(Some(owner_id), "get_credential", &result).await;
        result
    }

    async fn touch_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<()> {
        let result = self.inner.touch_credential(ctx, owner_id, service).await;
        self.record(Some(owner_id), "touch_credential", &result).await;
        result
    }

    async fn delete_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<()> {
        let result = self.inner.delete_credential(ctx, owner_id, service).await;
        self.record(Some(owner_id), "delete_credential", &result).await;
        result
    }

    async fn upsert_gateway_config(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        base_endpoint: Option<String>,
        secret: Option<SecretString>,
    ) -> Result<()> {
        let fingerprint = secret.as_ref().map(Fingerprint::of);
        let result = self.inner.upsert_gateway_config(ctx, owner_id, base_endpoint, secret).await;

        let mut event = AuditEvent::for_result("upsert_gateway_config", &result);
        if let (Ok(()), Some(fingerprint)) = (&result, &fingerprint) {
            event = event.with_fingerprint(fingerprint);
        }
        self.emitter.emit(Some(owner_id), event).await;
        result
    }

    async fn delete_gateway_config(&self, ctx: &ExecutionContext, owner_id: &OwnerId) -> Result<()> {
        let result = self.inner.delete_gateway_config(ctx, owner_id).await;
        self.record(Some(owner_id), "delete_gateway_config", &result).await;
        result
    }

    async fn get_gateway_base_endpoint(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<String> {
        let result = self.inner.get_gateway_base_endpoint(ctx, owner_id).await;
        self.record(Some(owner_id), "get_gateway_base_endpoint", &result).await;
        result
    }

    async fn get_gateway_secret(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<SecretString> {
        let result = self.inner.get_gateway_secret(ctx, owner_id).await;
        self.record(Some(owner_id), "get_gateway_secret", &result).await;
        result
    }

    async fn get_consent(&self, ctx: &ExecutionContext, owner_id: &OwnerId) -> Result<ConsentFlag> {
        let result = self.inner.get_consent(ctx, owner_id).await;
        self.record(Some(owner_id), "get_consent", &result).await;
        result
    }

    async fn set_consent(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        allow_team_fallback: bool,
        actor: ConsentActor,
    ) -> Result<ConsentFlag> {
        let result = self.inner.set_consent(ctx, owner_id, allow_team_fallback, actor).await;
        let event = AuditEvent::for_result("set_consent", &result).with_actor(actor);
        self.emitter.emit(Some(owner_id), event).await;
        result
    }

    async fn register_owner(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<ConsentFlag> {
        let result = self.inner.register_owner(ctx, owner_id).await;
        self.record(Some(owner_id), "register_owner", &result).await;
        result
    }

    async fn lookup_credential(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<CredentialRecord> {
        let result = self.inner.lookup_credential(ctx, owner_id, service).await;
        self.record(Some(owner_id), "lookup_credential", &result).await;
        result
    }

    async fn lookup_gateway(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<GatewayConfig> {
        let result = self.inner.lookup_gateway(ctx, owner_id).await;
        self.record(Some(owner_id), "lookup_gateway", &result).await;
        result
    }

    async fn list_credentials(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<Vec<CredentialSummary>> {
        let result = self.inner.list_credentials(ctx, owner_id).await;
        self.record(Some(owner_id), "list_credentials", &result).await;
        result
    }

    async fn reconcile_pending_deletes(&self, ctx: &ExecutionContext) -> Result<ReconcileReport> {
        let result = self.inner.reconcile_pending_deletes(ctx).await;
        self.record(None, "reconcile_pending_deletes", &result).await;
        result
    }
}
