//! Startup sequence for the credential vault
//!
//! Builds the process-wide object graph from a validated [`AppConfig`]:
//! - database pool (migrations applied when `auto_migrate` is set)
//! - the configured secret vault backend
//! - the audited Access Gate and the Provider Resolver sharing one emitter
//! - the team fallback credential, loaded once and never mutated

use std::sync::Arc;
use tracing::info;

use crate::audit::{AuditEmitter, DatabaseAuditSink};
use crate::config::AppConfig;
use crate::errors::Result;
use crate::gate::{AccessGate, AuditedGate, ExecutionContext};
use crate::observability::MetricsRecorder;
use crate::resolver::{ProviderResolver, RetryPolicy, TeamFallbackCredential};
use crate::secrets::build_vault;
use crate::storage::{create_pool, DbPool};

/// Gate type handed to callers: the Access Gate wrapped in auditing
pub type Gate = AuditedGate<AccessGate>;

/// Assembled services for one process.
///
/// The pool stays private; callers reach the store through `gate`:
///
/// ```compile_fail
/// # async fn leak(services: credvault::startup::Services) {
/// let _pool = services.pool.clone();
/// # }
/// ```
pub struct Services {
    pool: DbPool,
    pub gate: Arc<Gate>,
    pub resolver: ProviderResolver<Gate>,
    pub audit_log: DatabaseAuditSink,
    trusted: ExecutionContext,
}

impl Services {
    pub async fn bootstrap(config: &AppConfig, metrics: MetricsRecorder) -> Result<Self> {
        let pool = create_pool(&config.database).await?;
        Self::with_pool(config, pool, metrics)
    }

    /// Assemble services on an existing pool
    pub fn with_pool(config: &AppConfig, pool: DbPool, metrics: MetricsRecorder) -> Result<Self> {
        let vault = build_vault(&config.vault, pool.clone())?;
        let emitter = AuditEmitter::from_config(&config.audit, &pool)?;

        let access_gate =
            AccessGate::new(pool.clone(), vault, &config.gate).with_metrics(metrics.clone());
        let gate = Arc::new(AuditedGate::new(access_gate, emitter.clone()));

        let team_fallback = config
            .team_fallback
            .as_ref()
            .map(TeamFallbackCredential::from_config)
            .transpose()?
            .map(Arc::new);
        if let Some(team) = &team_fallback {
            info!(service = %team.service(), "Team fallback credential loaded");
        }

        let resolver = ProviderResolver::new(gate.clone())
            .with_team_fallback(team_fallback)
            .with_default_gateway_endpoint(config.gate.default_gateway_endpoint.clone())
            .with_retry_policy(RetryPolicy::from(&config.resolver))
            .with_audit(emitter)
            .with_metrics(metrics);

        Ok(Self {
            audit_log: DatabaseAuditSink::new(pool.clone()),
            pool,
            gate,
            resolver,
            trusted: ExecutionContext::service_role(config.gate.service_role_key.clone())
                .with_timeout(config.gate.operation_timeout()),
        })
    }

    /// The trusted execution context for this process
    pub fn trusted_context(&self) -> &ExecutionContext {
        &self.trusted
    }

    /// Close the database pool, waiting for open connections to finish
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TeamFallbackConfig;
    use crate::domain::{Capability, OwnerId, ServiceName};
    use crate::resolver::{Resolution, ResolutionTier};
    use crate::secrets::{SecretString, VaultBackendType};
    use crate::gate::CredentialGate;
    use tracing_test::traced_test;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.vault.backend = VaultBackendType::Memory;
        config.gate.service_role_key = SecretString::new("s".repeat(32));
        config.team_fallback = Some(TeamFallbackConfig {
            service: ServiceName::Anthropic,
            secret: SecretString::new("sk-team"),
            endpoint: None,
        });
        config
    }

    #[tokio::test]
    async fn test_bootstrapped_services_resolve_team_fallback() {
        let services = Services::with_pool(
            &config(),
            crate::storage::test_pool().await,
            MetricsRecorder::disabled(),
        )
        .unwrap();
        let owner = OwnerId::parse("fresh-owner").unwrap();

        let resolution = services
            .resolver
            .resolve(services.trusted_context(), &owner, &Capability::new(ServiceName::Anthropic))
            .await
            .unwrap();

        assert_eq!(resolution.tier(), Some(ResolutionTier::TeamFallback));
        let Resolution::Resolved(credential) = resolution else { unreachable!() };
        let secret = services
            .resolver
            .fetch_secret(services.trusted_context(), &credential)
            .await
            .unwrap();
        assert_eq!(secret.expose_secret(), "sk-team");

        let chain = services.audit_log.verify_chain().await.unwrap();
        assert!(chain.is_intact());
        assert!(chain.entries >= 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_audit_log_events_omit_secrets() {
        let services = Services::with_pool(
            &config(),
            crate::storage::test_pool().await,
            MetricsRecorder::disabled(),
        )
        .unwrap();
        let ctx = services.trusted_context();
        let owner = OwnerId::parse("u1").unwrap();

        services
            .gate
            .upsert_gateway_config(
                ctx,
                &owner,
                Some("https://gw.example/v1".into()),
                Some("gw-hidden-key".into()),
            )
            .await
            .unwrap();
        let resolution = services
            .resolver
            .resolve(ctx, &owner, &Capability::new(ServiceName::Mistral))
            .await
            .unwrap();
        let Resolution::Resolved(credential) = resolution else { unreachable!() };
        services.resolver.fetch_secret(ctx, &credential).await.unwrap();

        assert!(logs_contain("upsert_gateway_config"));
        assert!(logs_contain("Resolution finished"));
        assert!(!logs_contain("gw-hidden-key"));
        assert!(!logs_contain("sk-team"));
    }
}
