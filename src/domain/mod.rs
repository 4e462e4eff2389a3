//! Domain types shared by the store, the gate and the resolver.

pub mod credential;
pub mod endpoint;
pub mod id;
pub mod service;

pub use credential::{
    ConsentActor, ConsentFlag, CredentialRecord, CredentialSummary, Fingerprint, GatewayConfig,
    FINGERPRINT_DISPLAY_LEN,
};
pub use endpoint::{normalize_endpoint, EndpointError};
pub use id::{OwnerId, OwnerIdError, VaultRef};
pub use service::{Capability, ServiceName};
