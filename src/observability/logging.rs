//! # Structured Logging
//!
//! Subscriber setup plus span helpers. Security events go to the
//! [`SECURITY_TARGET`] target and audit records to [`AUDIT_TARGET`], so a
//! deployment can route them separately with an `EnvFilter` directive.

use crate::config::ObservabilityConfig;
use crate::errors::{CredvaultError, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Target for Forbidden attempts and other trust-boundary events
pub const SECURITY_TARGET: &str = "credvault::security";

/// Target for audit events emitted by the tracing sink
pub const AUDIT_TARGET: &str = "credvault::audit";

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            CredvaultError::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true).with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    if result.is_err() {
        // Subscriber already set elsewhere (e.g. integration tests); ignore.
    }
    Ok(())
}

/// Create a tracing span for Access Gate operations.
///
/// Owner IDs are never recorded on gate spans; the audit layer decides how
/// owners appear.
///
/// ```rust,ignore
/// let span = gate_span!("insert_or_replace_credential", service = %service);
/// ```
#[macro_export]
macro_rules! gate_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "gate_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "gate_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for one resolution request
#[macro_export]
macro_rules! resolve_span {
    ($service:expr) => {
        tracing::info_span!(
            "resolve",
            service = %$service,
            resolution_id = %uuid::Uuid::new_v4(),
            outcome = tracing::field::Empty
        )
    };
}

/// Log configuration at startup. Never logs key material.
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        vault_backend = %config.vault.backend,
        in_memory_database = config.database.is_in_memory(),
        operation_timeout_ms = config.gate.operation_timeout_ms,
        retry_attempts = config.resolver.max_attempts,
        team_fallback = ?config.team_fallback.as_ref().map(|t| t.service),
        audit_persist = config.audit.persist,
        pseudonymize_owners = config.audit.pseudonymize_owners,
        metrics_enabled = config.observability.enable_metrics,
        "Credential vault configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = gate_span!("get_credential");
        let _span = gate_span!("get_credential", service = "openai");
        let _span = resolve_span!("anthropic");
    }

    #[test]
    fn test_log_config_info() {
        log_config_info(&crate::config::AppConfig::default());
    }

    #[test]
    fn test_init_logging_is_reentrant() {
        let config = ObservabilityConfig::default();
        init_logging(&config).unwrap();
        init_logging(&config).unwrap();
    }
}
