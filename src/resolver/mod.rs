//! # Provider Resolution
//!
//! Chooses the credential and endpoint for one request under the
//! gateway, direct, team-fallback precedence, gated by owner consent.

pub mod provider;
pub mod retry;
pub mod team_fallback;
pub mod types;

pub use provider::ProviderResolver;
pub use retry::RetryPolicy;
pub use team_fallback::TeamFallbackCredential;
pub use types::{CredentialSource, DenialReason, Resolution, ResolutionTier, ResolvedCredential};
