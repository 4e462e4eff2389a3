//! The process-wide team credential.

use crate::config::TeamFallbackConfig;
use crate::domain::{normalize_endpoint, ServiceName};
use crate::errors::{CredvaultError, Result};
use crate::secrets::SecretString;

/// Loaded once at startup and shared read-only for the process lifetime.
/// Rotation means restarting with new configuration.
#[derive(Debug, Clone)]
pub struct TeamFallbackCredential {
    service: ServiceName,
    secret: SecretString,
    endpoint: String,
}

impl TeamFallbackCredential {
    pub fn new(service: ServiceName, secret: SecretString, endpoint: Option<&str>) -> Result<Self> {
        if secret.is_blank() {
            return Err(CredvaultError::config("Team fallback secret cannot be empty"));
        }

        let endpoint = match endpoint {
            Some(raw) => normalize_endpoint(raw)
                .map_err(|e| CredvaultError::config(format!("Team fallback endpoint: {}", e)))?,
            None => service.default_endpoint().map(str::to_string).ok_or_else(|| {
                CredvaultError::config(format!("Team fallback for '{}' needs an endpoint", service))
            })?,
        };

        Ok(Self { service, secret, endpoint })
    }

    pub fn from_config(config: &TeamFallbackConfig) -> Result<Self> {
        Self::new(config.service, config.secret.clone(), config.endpoint.as_deref())
    }

    /// A gateway credential covers every capability; a provider credential
    /// covers only its own service.
    pub fn covers(&self, service: ServiceName) -> bool {
        self.service.is_gateway() || self.service == service
    }

    pub fn service(&self) -> ServiceName {
        self.service
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }
}
