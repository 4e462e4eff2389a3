//! Execution contexts and the trusted-context check.

use crate::domain::OwnerId;
use crate::secrets::SecretString;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Fixed message the service-role key is bound to
const TRUST_CHALLENGE: &[u8] = b"credvault.trusted-execution-context.v1";

/// Identity the caller presents to the gate
#[derive(Clone)]
pub enum Principal {
    /// Trusted backend presenting the service-role key
    ServiceRole(SecretString),
    /// An authenticated end user. Never trusted for gate operations.
    User(OwnerId),
    Anonymous,
}

/// The context a gate operation is invoked from
#[derive(Clone)]
pub struct ExecutionContext {
    principal: Principal,
    timeout: Option<Duration>,
}

impl ExecutionContext {
    pub fn service_role(key: SecretString) -> Self {
        Self { principal: Principal::ServiceRole(key), timeout: None }
    }

    pub fn user(owner_id: OwnerId) -> Self {
        Self { principal: Principal::User(owner_id), timeout: None }
    }

    pub fn anonymous() -> Self {
        Self { principal: Principal::Anonymous, timeout: None }
    }

    /// Deadline applied to each vault and store call made on behalf of this
    /// context
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Label for logs. Never includes key material.
    pub fn kind(&self) -> &'static str {
        match self.principal {
            Principal::ServiceRole(_) => "service_role",
            Principal::User(_) => "user",
            Principal::Anonymous => "anonymous",
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("principal", &self.kind())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Verifies a presented service-role key against the configured one.
///
/// Only the HMAC tag of the configured key is held; comparison is constant
/// time.
#[derive(Clone)]
pub struct TrustVerifier {
    expected_tag: Vec<u8>,
}

impl TrustVerifier {
    pub fn new(service_role_key: &SecretString) -> Self {
        Self { expected_tag: tag_for(service_role_key.expose_secret().as_bytes()) }
    }

    pub fn is_trusted(&self, ctx: &ExecutionContext) -> bool {
        let Principal::ServiceRole(key) = ctx.principal() else {
            return false;
        };
        if key.is_empty() {
            return false;
        }
        match HmacSha256::new_from_slice(key.expose_secret().as_bytes()) {
            Ok(mut mac) => {
                mac.update(TRUST_CHALLENGE);
                mac.verify_slice(&self.expected_tag).is_ok()
            }
            Err(_) => false,
        }
    }
}

impl fmt::Debug for TrustVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TrustVerifier([REDACTED])")
    }
}

fn tag_for(key: &[u8]) -> Vec<u8> {
    match HmacSha256::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(TRUST_CHALLENGE);
            mac.finalize().into_bytes().to_vec()
        }
        // Unreachable for HMAC; an empty tag never verifies.
        Err(_) => Vec::new(),
    }
}
