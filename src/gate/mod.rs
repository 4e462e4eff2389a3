//! # Access Gate
//!
//! The privileged boundary around the Credential Store and the Secret Vault.
//! Nothing outside this module holds a vault or repository handle; callers
//! depend on the [`CredentialGate`] trait and are handed an implementation.

pub mod access_gate;
pub mod audited;
pub mod client;
pub mod context;

pub use access_gate::AccessGate;
pub use audited::AuditedGate;
pub use client::{CredentialGate, ReconcileReport};
pub use context::{ExecutionContext, Principal, TrustVerifier};
