//! AES-256-GCM encryption for the database-backed vault.
//!
//! Each entry gets a fresh random 96-bit nonce. The vault reference is bound
//! as additional authenticated data, so a ciphertext copied onto another
//! row fails to decrypt.

use crate::errors::{CredvaultError, Result};
use crate::secrets::SecretString;
use base64::Engine;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Size of AES-256-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of AES-256-GCM tag in bytes
const TAG_SIZE: usize = 16;

const KEY_SIZE: usize = 32;

/// Key material for [`SecretCipher`]
#[derive(Debug, Clone)]
pub struct CipherConfig {
    /// Base64-encoded 32-byte master key
    pub master_key: SecretString,
    /// Key version recorded next to each ciphertext
    pub key_version: String,
}

impl CipherConfig {
    /// Fixed all-0x42 key. Development and tests only.
    pub fn insecure_for_testing() -> Self {
        Self {
            master_key: SecretString::new(
                base64::engine::general_purpose::STANDARD.encode([0x42u8; KEY_SIZE]),
            ),
            key_version: "test".to_string(),
        }
    }
}

/// Single-use nonce sequence for AES-GCM
struct SingleNonce(Option<[u8; NONCE_SIZE]>);

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Ciphertext, nonce and key version as persisted
#[derive(Debug, Clone)]
pub struct SealedSecret {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub key_version: String,
}

#[derive(Clone)]
pub struct SecretCipher {
    key_bytes: Arc<[u8; KEY_SIZE]>,
    key_version: String,
    rng: Arc<SystemRandom>,
}

impl SecretCipher {
    pub fn new(config: &CipherConfig) -> Result<Self> {
        let key_bytes = base64::engine::general_purpose::STANDARD
            .decode(config.master_key.expose_secret())
            .map_err(|e| CredvaultError::config(format!("Invalid base64 in vault encryption key: {}", e)))?;

        if key_bytes.len() != KEY_SIZE {
            return Err(CredvaultError::config(format!(
                "Vault encryption key must be {} bytes (256 bits), got {} bytes",
                KEY_SIZE,
                key_bytes.len()
            )));
        }

        let mut key_array = [0u8; KEY_SIZE];
        key_array.copy_from_slice(&key_bytes);

        debug!(key_version = %config.key_version, "Vault cipher initialized");

        Ok(Self {
            key_bytes: Arc::new(key_array),
            key_version: config.key_version.clone(),
            rng: Arc::new(SystemRandom::new()),
        })
    }

    pub fn key_version(&self) -> &str {
        &self.key_version
    }

    fn unbound_key(&self) -> Result<UnboundKey> {
        UnboundKey::new(&AES_256_GCM, &*self.key_bytes).map_err(|_| {
            error!("Failed to create vault cipher key");
            CredvaultError::internal("Failed to create vault cipher key")
        })
    }

    /// Encrypt `plaintext`, authenticating `associated` alongside it.
    #[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
    pub fn seal(&self, plaintext: &[u8], associated: &[u8]) -> Result<SealedSecret> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            error!("Failed to generate random nonce");
            CredvaultError::internal("Failed to generate random nonce for encryption")
        })?;

        let mut sealing_key =
            aead::SealingKey::new(self.unbound_key()?, SingleNonce(Some(nonce_bytes)));

        let mut ciphertext = plaintext.to_vec();
        ciphertext.reserve(TAG_SIZE);
        sealing_key.seal_in_place_append_tag(Aad::from(associated), &mut ciphertext).map_err(
            |_| {
                error!("Encryption failed");
                CredvaultError::internal("Failed to encrypt secret")
            },
        )?;

        Ok(SealedSecret {
            ciphertext,
            nonce: nonce_bytes.to_vec(),
            key_version: self.key_version.clone(),
        })
    }

    /// Decrypt a ciphertext produced by [`SecretCipher::seal`] with the same
    /// associated data.
    #[instrument(skip_all, fields(ciphertext_len = ciphertext.len()))]
    pub fn open(&self, ciphertext: &[u8], nonce: &[u8], associated: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != NONCE_SIZE {
            return Err(CredvaultError::internal(format!(
                "Invalid nonce length: expected {} bytes, got {} bytes",
                NONCE_SIZE,
                nonce.len()
            )));
        }
        if ciphertext.len() < TAG_SIZE {
            return Err(CredvaultError::internal(
                "Ciphertext too short (missing authentication tag)",
            ));
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);

        let mut opening_key =
            aead::OpeningKey::new(self.unbound_key()?, SingleNonce(Some(nonce_bytes)));

        let mut buffer = ciphertext.to_vec();
        let plaintext = opening_key.open_in_place(Aad::from(associated), &mut buffer).map_err(|_| {
            error!("Decryption failed - possible tampering or wrong key");
            CredvaultError::internal("Failed to decrypt secret - authentication failed")
        })?;

        Ok(plaintext.to_vec())
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher")
            .field("key_version", &self.key_version)
            .field("key_bytes", &"[REDACTED]")
            .finish()
    }
}
