//! # Configuration Management
//!
//! Layered loading with the `config` crate: an optional file, then
//! environment variables prefixed `CREDVAULT_` with `__` between nested keys,
//! e.g. `CREDVAULT_GATE__SERVICE_ROLE_KEY` or `CREDVAULT_TEAM_FALLBACK__SECRET`.

pub mod settings;

pub use settings::{
    AppConfig, AuditConfig, DatabaseConfig, GateConfig, HashicorpVaultConfig,
    ObservabilityConfig, ResolverConfig, TeamFallbackConfig, VaultConfig, MIN_KEY_LEN,
};

use crate::errors::Result;
use std::path::Path;

pub const ENV_PREFIX: &str = "CREDVAULT";

/// Default file looked up when no explicit path is given (any format the
/// `config` crate recognizes by extension)
pub const DEFAULT_CONFIG_BASENAME: &str = "credvault";

/// Load and validate configuration.
///
/// With `path`, the file must exist. Without it, `credvault.{toml,yaml,json}`
/// in the working directory is used when present.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let file_source = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_BASENAME).required(false),
    };

    let app_config: AppConfig = config::Config::builder()
        .add_source(file_source)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    app_config.validate()?;
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "sqlite::memory:"

[vault]
backend = "memory"

[gate]
service_role_key = "0123456789abcdef0123456789abcdef"
operation_timeout_ms = 250
default_gateway_endpoint = "https://gw.internal/v1"

[team_fallback]
service = "anthropic"
secret = "team-secret"
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.gate.operation_timeout_ms, 250);
        assert_eq!(config.resolver.max_attempts, 3);
        assert_eq!(config.vault.backend, crate::secrets::VaultBackendType::Memory);

        let team = config.team_fallback.unwrap();
        assert_eq!(team.service, crate::domain::ServiceName::Anthropic);
        assert_eq!(team.secret.expose_secret(), "team-secret");
    }

    #[test]
    fn test_missing_required_file_fails() {
        assert!(load_config(Some(Path::new("/nonexistent/credvault.toml"))).is_err());
    }
}
