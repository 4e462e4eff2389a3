//! # Provider Resolver
//!
//! Decides, per request, which credential and endpoint serve a capability.
//! Tiers run strictly in order and stop at the first hit:
//!
//! 1. the owner's gateway, when it has a secret and an endpoint
//! 2. the owner's direct credential for the requested service
//! 3. the owner's consent flag (`false` ends in `Denied(no_consent)`)
//! 4. the process-wide team credential, if it covers the service
//!
//! Only `NotFound` moves resolution to the next tier. `Forbidden` is
//! returned as an error immediately. `Unavailable` is retried with backoff
//! and, once retries run out, ends in `Denied(unavailable)` rather than a
//! lower tier.
//!
//! Nothing is cached between calls; a resolution reflects the store as of
//! the call.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn, Instrument};

use super::retry::RetryPolicy;
use super::team_fallback::TeamFallbackCredential;
use super::types::{
    CredentialSource, DenialReason, Resolution, ResolutionTier, ResolvedCredential,
};
use crate::audit::{AuditEmitter, AuditEvent, AuditOutcome};
use crate::domain::{Capability, OwnerId, ServiceName};
use crate::errors::{CredvaultError, Result};
use crate::gate::{CredentialGate, ExecutionContext};
use crate::observability::MetricsRecorder;
use crate::secrets::SecretString;

pub struct ProviderResolver<G: CredentialGate + ?Sized> {
    gate: Arc<G>,
    team_fallback: Option<Arc<TeamFallbackCredential>>,
    default_gateway_endpoint: Option<String>,
    retry: RetryPolicy,
    emitter: AuditEmitter,
    metrics: MetricsRecorder,
}

impl<G: CredentialGate + ?Sized> ProviderResolver<G> {
    pub fn new(gate: Arc<G>) -> Self {
        Self {
            gate,
            team_fallback: None,
            default_gateway_endpoint: None,
            retry: RetryPolicy::default(),
            emitter: AuditEmitter::disabled(),
            metrics: MetricsRecorder::disabled(),
        }
    }

    pub fn with_team_fallback(mut self, team_fallback: Option<Arc<TeamFallbackCredential>>) -> Self {
        self.team_fallback = team_fallback;
        self
    }

    /// Endpoint for gateways that carry a secret but no base endpoint
    pub fn with_default_gateway_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.default_gateway_endpoint = endpoint;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_audit(mut self, emitter: AuditEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsRecorder) -> Self {
        self.metrics = metrics;
        self
    }

    /// Resolve a credential for `owner_id` and `capability`.
    ///
    /// Returns `Err` only for `Forbidden` (and other non-retryable gate
    /// failures); every other terminal state is a [`Resolution`].
    pub async fn resolve(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        capability: &Capability,
    ) -> Result<Resolution> {
        let span = crate::resolve_span!(capability.service);
        let result =
            self.run_tiers(ctx, owner_id, capability.service).instrument(span.clone()).await;

        let resolution = match result {
            Ok(resolution) => resolution,
            Err(e) if e.is_retryable() => {
                warn!(parent: &span, service = %capability.service, error = %e, "Credential store unavailable, denying resolution");
                Resolution::Denied(DenialReason::Unavailable)
            }
            Err(e) => {
                span.record("outcome", "error");
                self.metrics.record_resolution("error");
                self.emitter
                    .emit(Some(owner_id), AuditEvent::new("resolve", AuditOutcome::from_error(&e)))
                    .await;
                return Err(e);
            }
        };

        span.record("outcome", resolution.outcome_label());
        self.metrics.record_resolution(resolution.outcome_label());
        self.emitter.emit(Some(owner_id), Self::audit_event(&resolution)).await;
        info!(
            parent: &span,
            service = %capability.service,
            outcome = resolution.outcome_label(),
            "Resolution finished"
        );

        Ok(resolution)
    }

    fn audit_event(resolution: &Resolution) -> AuditEvent {
        match resolution {
            Resolution::Resolved(credential) => {
                AuditEvent::new("resolve", AuditOutcome::Success).with_tier(credential.tier)
            }
            Resolution::Denied(reason) => {
                AuditEvent::new("resolve", AuditOutcome::from_denial(*reason)).with_reason(*reason)
            }
        }
    }

    /// Fetch the secret for a resolved credential, immediately before use.
    ///
    /// Owner tiers read the current vault entry through the gate; a direct
    /// credential also has its `last_used_at` touched. The secret is not
    /// retained.
    #[instrument(skip_all, fields(tier = %credential.tier, service = %credential.service))]
    pub async fn fetch_secret(
        &self,
        ctx: &ExecutionContext,
        credential: &ResolvedCredential,
    ) -> Result<SecretString> {
        let owner_id = &credential.owner_id;
        match credential.tier {
            ResolutionTier::Gateway => {
                self.retry
                    .run("get_gateway_secret", &self.metrics, || {
                        self.gate.get_gateway_secret(ctx, owner_id)
                    })
                    .await
            }
            ResolutionTier::Direct => {
                let service = credential.service;
                let secret = self
                    .retry
                    .run("get_credential", &self.metrics, || {
                        self.gate.get_credential(ctx, owner_id, service)
                    })
                    .await?;

                if let Err(e) = self.gate.touch_credential(ctx, owner_id, service).await {
                    warn!(error = %e, "Failed to record credential use");
                }
                Ok(secret)
            }
            ResolutionTier::TeamFallback => match (&credential.source, &self.team_fallback) {
                (CredentialSource::TeamFallback, Some(team)) => Ok(team.secret().clone()),
                _ => Err(CredvaultError::not_found("team_fallback", credential.service.as_str())),
            },
        }
    }

    async fn run_tiers(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<Resolution> {
        if let Some(resolved) = self.gateway_tier(ctx, owner_id).await? {
            return Ok(Resolution::Resolved(resolved));
        }

        if let Some(resolved) = self.direct_tier(ctx, owner_id, service).await? {
            return Ok(Resolution::Resolved(resolved));
        }

        let consent = self
            .retry
            .run("get_consent", &self.metrics, || self.gate.get_consent(ctx, owner_id))
            .await?;
        if !consent.allow_team_fallback {
            debug!(version = consent.version, "Team fallback not consented");
            return Ok(Resolution::Denied(DenialReason::NoConsent));
        }

        match &self.team_fallback {
            Some(team) if team.covers(service) => Ok(Resolution::Resolved(ResolvedCredential {
                owner_id: owner_id.clone(),
                service: team.service(),
                tier: ResolutionTier::TeamFallback,
                source: CredentialSource::TeamFallback,
                endpoint: team.endpoint().to_string(),
            })),
            _ => Ok(Resolution::Denied(DenialReason::NoCredential)),
        }
    }

    async fn gateway_tier(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
    ) -> Result<Option<ResolvedCredential>> {
        let lookup = self
            .retry
            .run("lookup_gateway", &self.metrics, || self.gate.lookup_gateway(ctx, owner_id))
            .await;
        let Some(config) = found(lookup)? else {
            return Ok(None);
        };

        let Some(vault_ref) = config.vault_ref else {
            debug!("Gateway configured without a secret");
            return Ok(None);
        };
        let Some(endpoint) = config.base_endpoint.or_else(|| self.default_gateway_endpoint.clone())
        else {
            debug!("Gateway secret has no endpoint to target");
            return Ok(None);
        };

        Ok(Some(ResolvedCredential {
            owner_id: owner_id.clone(),
            service: ServiceName::Gateway,
            tier: ResolutionTier::Gateway,
            source: CredentialSource::Vault(vault_ref),
            endpoint,
        }))
    }

    async fn direct_tier(
        &self,
        ctx: &ExecutionContext,
        owner_id: &OwnerId,
        service: ServiceName,
    ) -> Result<Option<ResolvedCredential>> {
        let Some(endpoint) = service.default_endpoint() else {
            return Ok(None);
        };

        let lookup = self
            .retry
            .run("lookup_credential", &self.metrics, || {
                self.gate.lookup_credential(ctx, owner_id, service)
            })
            .await;

        Ok(found(lookup)?.map(|record| ResolvedCredential {
            owner_id: owner_id.clone(),
            service,
            tier: ResolutionTier::Direct,
            source: CredentialSource::Vault(record.vault_ref),
            endpoint: endpoint.to_string(),
        }))
    }
}

/// `NotFound` means "try the next tier"; everything else propagates
fn found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
