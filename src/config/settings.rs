//! # Application Settings
//!
//! Typed configuration sections. Every section implements `Default` and is
//! `#[serde(default)]`, so a deployment only sets what differs.

use crate::domain::{normalize_endpoint, ServiceName};
use crate::errors::{CredvaultError, Result};
use crate::secrets::{SecretString, VaultBackendType};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Minimum length of the service-role key and the pseudonym key
pub const MIN_KEY_LEN: usize = 32;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    #[validate(nested)]
    pub database: DatabaseConfig,

    #[validate(nested)]
    pub vault: VaultConfig,

    #[validate(nested)]
    pub gate: GateConfig,

    #[validate(nested)]
    pub resolver: ResolverConfig,

    pub audit: AuditConfig,

    /// Process-wide team credential; absent means the fallback tier never
    /// resolves
    pub team_fallback: Option<TeamFallbackConfig>,

    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(CredvaultError::from)?;
        self.validate_custom()
    }

    /// Validation the validator crate cannot express
    fn validate_custom(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(CredvaultError::config("Database URL must start with 'sqlite:'"));
        }

        match self.vault.backend {
            VaultBackendType::Database => {
                let key = self.vault.encryption_key.as_ref().ok_or_else(|| {
                    CredvaultError::config("vault.encryption_key is required for the database vault")
                })?;
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(key.expose_secret())
                    .map_err(|_| CredvaultError::config("vault.encryption_key must be base64"))?;
                if decoded.len() != 32 {
                    return Err(CredvaultError::config(
                        "vault.encryption_key must decode to 32 bytes",
                    ));
                }
            }
            VaultBackendType::Hashicorp => {
                let hashicorp = self.vault.hashicorp.as_ref().ok_or_else(|| {
                    CredvaultError::config("vault.hashicorp is required for the hashicorp vault")
                })?;
                Validate::validate(hashicorp).map_err(CredvaultError::from)?;
            }
            VaultBackendType::Memory => {}
        }

        if self.gate.service_role_key.len() < MIN_KEY_LEN {
            return Err(CredvaultError::config(format!(
                "gate.service_role_key must be at least {} characters long",
                MIN_KEY_LEN
            )));
        }

        if let Some(endpoint) = &self.gate.default_gateway_endpoint {
            normalize_endpoint(endpoint).map_err(|e| {
                CredvaultError::config(format!("gate.default_gateway_endpoint: {}", e))
            })?;
        }

        if self.resolver.max_backoff_ms < self.resolver.initial_backoff_ms {
            return Err(CredvaultError::config(
                "resolver.max_backoff_ms cannot be lower than resolver.initial_backoff_ms",
            ));
        }

        if self.audit.pseudonymize_owners {
            let long_enough =
                self.audit.pseudonym_key.as_ref().is_some_and(|k| k.len() >= MIN_KEY_LEN);
            if !long_enough {
                return Err(CredvaultError::config(format!(
                    "audit.pseudonym_key of at least {} characters is required when pseudonymizing owners",
                    MIN_KEY_LEN
                )));
            }
        }

        if let Some(team) = &self.team_fallback {
            team.validate()?;
        }

        Ok(())
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Apply embedded migrations when the pool is created
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/credvault.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

/// Secret Vault adapter selection
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VaultConfig {
    pub backend: VaultBackendType,

    /// Base64 32-byte AES key for the database vault
    pub encryption_key: Option<SecretString>,

    #[validate(length(min = 1, message = "Key version cannot be empty"))]
    pub key_version: String,

    pub hashicorp: Option<HashicorpVaultConfig>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            backend: VaultBackendType::Database,
            encryption_key: None,
            key_version: "v1".to_string(),
            hashicorp: None,
        }
    }
}

/// HashiCorp Vault KV v2 connection
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HashicorpVaultConfig {
    #[validate(url(message = "HashiCorp Vault address must be a URL"))]
    pub address: String,

    pub token: Option<SecretString>,

    /// Vault Enterprise namespace
    pub namespace: Option<String>,

    /// KV v2 mount path
    #[serde(default = "default_kv_mount")]
    #[validate(length(min = 1, message = "KV mount cannot be empty"))]
    pub mount: String,

    /// Path under the mount that holds credential entries
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
}

fn default_kv_mount() -> String {
    "secret".to_string()
}

fn default_path_prefix() -> String {
    "credvault".to_string()
}

/// Access Gate settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GateConfig {
    /// Key the trusted execution context presents to the gate
    pub service_role_key: SecretString,

    /// Deadline applied to each vault and store call when the caller
    /// supplies none
    #[validate(range(
        min = 10,
        max = 60000,
        message = "Operation timeout must be between 10ms and 60s"
    ))]
    pub operation_timeout_ms: u64,

    /// Endpoint used for a gateway config that carries a secret but no
    /// base endpoint
    pub default_gateway_endpoint: Option<String>,

    /// Rows and orphans handled per reconciliation pass
    #[validate(range(min = 1, max = 10000, message = "Reconcile batch must be between 1 and 10000"))]
    pub reconcile_batch_size: i64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            service_role_key: SecretString::new(""),
            operation_timeout_ms: 5000,
            default_gateway_endpoint: None,
            reconcile_batch_size: 100,
        }
    }
}

impl GateConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// Retry policy the resolver applies around gate calls
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ResolverConfig {
    #[validate(range(min = 1, max = 10, message = "Max attempts must be between 1 and 10"))]
    pub max_attempts: u32,

    #[validate(range(min = 1, max = 10000, message = "Initial backoff must be between 1 and 10000ms"))]
    pub initial_backoff_ms: u64,

    #[validate(range(min = 1, max = 60000, message = "Max backoff must be between 1 and 60000ms"))]
    pub max_backoff_ms: u64,

    #[validate(range(min = 1.0, max = 10.0, message = "Backoff multiplier must be between 1 and 10"))]
    pub backoff_multiplier: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 50, max_backoff_ms: 1000, backoff_multiplier: 2.0 }
    }
}

/// Audit trail settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Replace owner IDs in events with a keyed HMAC
    pub pseudonymize_owners: bool,

    pub pseudonym_key: Option<SecretString>,

    /// Write events to the hash-chained `audit_log` table
    pub persist: bool,

    /// Emit events as tracing records on the `credvault::audit` target
    pub log_events: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { pseudonymize_owners: false, pseudonym_key: None, persist: true, log_events: true }
    }
}

/// The process-wide team credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamFallbackConfig {
    /// Provider the credential belongs to; `gateway` covers every capability
    pub service: ServiceName,

    pub secret: SecretString,

    /// Overrides the provider's public endpoint; required for `gateway`
    pub endpoint: Option<String>,
}

impl TeamFallbackConfig {
    fn validate(&self) -> Result<()> {
        if self.secret.is_blank() {
            return Err(CredvaultError::config("team_fallback.secret cannot be empty"));
        }

        match &self.endpoint {
            Some(endpoint) => {
                normalize_endpoint(endpoint).map_err(|e| {
                    CredvaultError::config(format!("team_fallback.endpoint: {}", e))
                })?;
            }
            None if self.service.default_endpoint().is_none() => {
                return Err(CredvaultError::config(format!(
                    "team_fallback.endpoint is required for service '{}'",
                    self.service
                )));
            }
            None => {}
        }

        Ok(())
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or `EnvFilter` directive (overridden by `RUST_LOG`)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Record metrics through the `metrics` facade
    pub enable_metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false, enable_metrics: true }
    }
}
