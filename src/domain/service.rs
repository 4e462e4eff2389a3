//! External capability providers.
//!
//! Service names are a closed set so the resolver's tier logic is checked
//! exhaustively. The stored form is the lowercase `as_str` value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External capability provider a credential belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceName {
    /// OpenAI-compatible chat and embeddings API
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Google,
    Mistral,
    /// Provider-agnostic proxy configured per owner
    Gateway,
}

impl ServiceName {
    /// All known services, in a stable order
    pub const ALL: [ServiceName; 5] = [
        ServiceName::OpenAi,
        ServiceName::Anthropic,
        ServiceName::Google,
        ServiceName::Mistral,
        ServiceName::Gateway,
    ];

    /// Get the database representation of this service
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Mistral => "mistral",
            Self::Gateway => "gateway",
        }
    }

    /// Public API endpoint used when a direct-provider credential resolves.
    ///
    /// The gateway has no public default; its endpoint comes from the owner's
    /// gateway config or from deployment configuration.
    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Anthropic => Some("https://api.anthropic.com/v1"),
            Self::Google => Some("https://generativelanguage.googleapis.com/v1beta"),
            Self::Mistral => Some("https://api.mistral.ai/v1"),
            Self::Gateway => None,
        }
    }

    pub fn is_gateway(&self) -> bool {
        matches!(self, Self::Gateway)
    }
}

impl FromStr for ServiceName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "google" | "gemini" => Ok(Self::Google),
            "mistral" => Ok(Self::Mistral),
            "gateway" => Ok(Self::Gateway),
            other => Err(format!("Unknown service: {}", other)),
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A capability requested by the business layer, e.g. chat completion via a
/// given model family on a given provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub service: ServiceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_family: Option<String>,
}

impl Capability {
    pub fn new(service: ServiceName) -> Self {
        Self { service, model_family: None }
    }

    pub fn with_model_family(mut self, family: impl Into<String>) -> Self {
        self.model_family = Some(family.into());
        self
    }
}

impl From<ServiceName> for Capability {
    fn from(service: ServiceName) -> Self {
        Self::new(service)
    }
}
