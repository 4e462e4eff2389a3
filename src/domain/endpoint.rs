//! Base endpoint validation for gateway configs and the team credential.

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("endpoint is empty")]
    Empty,
    #[error("endpoint is not a valid URL: {0}")]
    Invalid(String),
    #[error("endpoint scheme must be http or https, got '{0}'")]
    Scheme(String),
    #[error("endpoint must include a host")]
    MissingHost,
    #[error("endpoint must not embed credentials")]
    EmbeddedCredentials,
}

/// Validate a base endpoint and return it in canonical form (trimmed, no
/// trailing slash).
pub fn normalize_endpoint(raw: &str) -> Result<String, EndpointError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EndpointError::Empty);
    }

    let parsed = Url::parse(trimmed).map_err(|e| EndpointError::Invalid(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(EndpointError::Scheme(other.to_string())),
    }
    if parsed.host_str().is_none() {
        return Err(EndpointError::MissingHost);
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(EndpointError::EmbeddedCredentials);
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}
