//! # Credvault
//!
//! Per-owner storage of third-party provider credentials, a privileged
//! Access Gate in front of the secrets, and a Provider Resolver that picks
//! the credential and endpoint for each request.
//!
//! ## Architecture
//!
//! ```text
//! business layer ─▶ ProviderResolver ─▶ AuditedGate ─▶ AccessGate ─┬─▶ SecretVault
//!                                                                  └─▶ Credential Store (SQLite)
//! ```
//!
//! The store's row-level repositories are private to this crate, and
//! [`startup::Services`] does not hand out its pool. [`gate::AccessGate`] is
//! the only holder of the vault and of the credential, gateway, consent and
//! orphan repositories. [`audit::DatabaseAuditSink`] appends to the audit
//! log and can verify its chain, but never reads credential rows.
//!
//! Everything else depends on the [`gate::CredentialGate`] trait and presents
//! an [`gate::ExecutionContext`]; only the service-role context is trusted.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use credvault::{config::load_config, observability::MetricsRecorder, startup::Services};
//! use credvault::domain::{Capability, OwnerId, ServiceName};
//!
//! # async fn run() -> credvault::Result<()> {
//! let config = load_config(None)?;
//! let services = Services::bootstrap(&config, MetricsRecorder::disabled()).await?;
//! let owner = OwnerId::parse("user-42").expect("valid owner id");
//!
//! let resolution = services
//!     .resolver
//!     .resolve(services.trusted_context(), &owner, &Capability::new(ServiceName::Anthropic))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gate;
pub mod observability;
pub mod resolver;
pub mod secrets;
pub mod startup;
pub mod storage;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{CredvaultError, ErrorKind, Result};
pub use gate::{CredentialGate, ExecutionContext};
pub use resolver::{ProviderResolver, Resolution};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
