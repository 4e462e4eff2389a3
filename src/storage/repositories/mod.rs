//! # Repositories
//!
//! Row-level access to each table. Crate-private: the Access Gate holds the
//! credential, gateway, consent and orphan repositories, and the database
//! audit sink holds the audit log repository.

pub mod audit_log;
pub mod consent;
pub mod credential;
pub mod gateway;
pub mod orphan;

pub use audit_log::{AuditLogRepository, ChainVerification};
pub use consent::ConsentRepository;
pub use credential::CredentialRepository;
pub use gateway::{GatewayRepository, GatewaySecretRef};
pub use orphan::OrphanRepository;
