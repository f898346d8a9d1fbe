//! Credential vault
//!
//! Symmetric at-rest encryption of per-cluster kubeconfig documents.
//! Ciphertexts are `nonce || AES-256-GCM(plaintext) || tag`, so everything
//! except the key travels with the blob.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

/// AES-256-GCM encryption key size in bytes
pub const KEY_SIZE: usize = 32;
/// Nonce size for AES-256-GCM
const NONCE_SIZE: usize = 12;
/// Authentication tag size for AES-256-GCM
const TAG_SIZE: usize = 16;
/// Length of a URL-safe base64 encoded 32-byte key
const ENCODED_KEY_LEN: usize = 44;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),
}

/// Where the process-wide key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Derived from the configured secret
    Configured,
    /// Generated at startup; data encrypted with it is lost on restart
    Generated,
}

/// 32-byte symmetric key, zeroized on drop
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: Zeroizing<[u8; KEY_SIZE]>,
    source: KeySource,
}

impl EncryptionKey {
    /// Derive a key from an arbitrary-length secret.
    ///
    /// A 44-character URL-safe base64 string decoding to exactly 32 bytes is
    /// taken as a ready-made key. Anything else is right-padded with spaces
    /// or truncated to 32 bytes. The mapping is deterministic so previously
    /// stored blobs stay readable across restarts.
    pub fn derive(raw_secret: &str) -> Self {
        let mut bytes = Zeroizing::new([b' '; KEY_SIZE]);

        if raw_secret.len() == ENCODED_KEY_LEN {
            if let Ok(decoded) = base64::engine::general_purpose::URL_SAFE.decode(raw_secret) {
                if decoded.len() == KEY_SIZE {
                    bytes.copy_from_slice(&decoded);
                    return Self {
                        bytes,
                        source: KeySource::Configured,
                    };
                }
            }
        }

        let raw = raw_secret.as_bytes();
        let len = raw.len().min(KEY_SIZE);
        bytes[..len].copy_from_slice(&raw[..len]);

        Self {
            bytes,
            source: KeySource::Configured,
        }
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        rand::thread_rng().fill(&mut bytes[..]);
        Self {
            bytes,
            source: KeySource::Generated,
        }
    }

    /// Resolve the process-wide key from an optional configured secret.
    ///
    /// Falls back to a generated key and says so loudly.
    pub fn from_secret_or_generate(secret: Option<&str>) -> Self {
        match secret.filter(|s| !s.is_empty()) {
            Some(secret) => {
                tracing::info!("Encryption key derived from configured secret");
                Self::derive(secret)
            }
            None => {
                tracing::warn!(
                    "No ENCRYPTION_KEY configured; generated an ephemeral key. \
                     Stored cluster credentials will be unreadable after restart"
                );
                Self::generate()
            }
        }
    }

    pub fn source(&self) -> KeySource {
        self.source
    }

    pub fn is_ephemeral(&self) -> bool {
        self.source == KeySource::Generated
    }

    /// URL-safe base64 form, accepted back by [`EncryptionKey::derive`]
    pub fn encode(&self) -> String {
        base64::engine::general_purpose::URL_SAFE.encode(&self.bytes[..])
    }

    fn cipher(&self) -> Result<Aes256Gcm, VaultError> {
        Aes256Gcm::new_from_slice(&self.bytes[..])
            .map_err(|e| VaultError::Encryption(format!("Failed to create cipher: {}", e)))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Encrypt with AES-256-GCM under a fresh random nonce
pub fn encrypt(key: &EncryptionKey, plaintext: &str) -> Result<Vec<u8>, VaultError> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = key
        .cipher()?
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt a blob produced by [`encrypt`].
///
/// Malformed input, a tag mismatch and a wrong key all fail; a failure is
/// never reported as an empty plaintext.
pub fn decrypt(key: &EncryptionKey, ciphertext: &[u8]) -> Result<Zeroizing<String>, VaultError> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(VaultError::Decryption("ciphertext too short".to_string()));
    }

    let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
    let plaintext = key
        .cipher()
        .map_err(|e| VaultError::Decryption(e.to_string()))?
        .decrypt(nonce, &ciphertext[NONCE_SIZE..])
        .map_err(|_| {
            VaultError::Decryption("authentication failed (wrong key or corrupted data)".to_string())
        })?;

    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|_| VaultError::Decryption("plaintext is not valid UTF-8".to_string()))
}

/// Encrypts and decrypts cluster credentials with the process-wide key
#[derive(Debug, Clone)]
pub struct CredentialVault {
    key: Arc<EncryptionKey>,
}

impl CredentialVault {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key: Arc::new(key) }
    }

    pub fn key_source(&self) -> KeySource {
        self.key.source()
    }

    pub fn seal(&self, kubeconfig: &str) -> Result<Vec<u8>, VaultError> {
        encrypt(&self.key, kubeconfig)
    }

    pub fn open(&self, blob: &[u8]) -> Result<Zeroizing<String>, VaultError> {
        decrypt(&self.key, blob)
    }
}
