//! At-rest protection for the stored instance identifier.
//!
//! Two ciphers are available:
//!
//! - [`InstanceCipher::AesGcm`]: AES-256-GCM keyed by the SHA-256 digest of
//!   the machine secret. Output is Base64 of `[nonce (12 bytes)] || [ciphertext+tag]`.
//! - [`InstanceCipher::Marker`]: appends a fixed suffix. Provides no
//!   confidentiality and is only meant for fully trusted filesystems.
//!
//! Decryption never panics. Anything that was not produced by `encrypt` with
//! the same key fails with [`CryptoError::InvalidFormat`].

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use rand::rngs::OsRng;
use rand::TryRngCore;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// GCM nonce size in bytes (96-bit).
pub const NONCE_SIZE: usize = 12;

/// Suffix used by the marker cipher.
pub const MARKER_SUFFIX: &str = "_encrypted";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid encrypted value: {0}")]
    InvalidFormat(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Cipher applied to the instance identifier before it is written to disk.
#[derive(Clone)]
pub enum InstanceCipher {
    AesGcm { key: [u8; KEY_SIZE] },
    Marker,
}

impl std::fmt::Debug for InstanceCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceCipher::AesGcm { .. } => f.write_str("InstanceCipher::AesGcm(<redacted>)"),
            InstanceCipher::Marker => f.write_str("InstanceCipher::Marker"),
        }
    }
}

/// Derive a 256-bit key from an arbitrary-length machine secret.
pub fn derive_key(secret: &str) -> [u8; KEY_SIZE] {
    let digest = Sha256::digest(secret.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest);
    key
}

impl InstanceCipher {
    /// AES-256-GCM cipher keyed from the given machine secret.
    pub fn from_secret(secret: &str) -> Self {
        InstanceCipher::AesGcm {
            key: derive_key(secret),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        match self {
            InstanceCipher::AesGcm { key } => encrypt_to_base64(plaintext.as_bytes(), key),
            InstanceCipher::Marker => Ok(format!("{plaintext}{MARKER_SUFFIX}")),
        }
    }

    pub fn decrypt(&self, ciphertext: &str) -> CryptoResult<String> {
        match self {
            InstanceCipher::AesGcm { key } => {
                let bytes = decrypt_from_base64(ciphertext, key)?;
                String::from_utf8(bytes)
                    .map_err(|e| CryptoError::InvalidFormat(format!("not utf-8: {e}")))
            }
            InstanceCipher::Marker => ciphertext
                .strip_suffix(MARKER_SUFFIX)
                .map(str::to_string)
                .ok_or_else(|| CryptoError::InvalidFormat("missing marker suffix".to_string())),
        }
    }
}

/// Encrypt arbitrary bytes using AES-256-GCM.
///
/// Output format:
///   [nonce (12 bytes)] || [ciphertext+tag]
pub fn encrypt_bytes(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::Encryption(format!("nonce generation failed: {e}")))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.append(&mut ciphertext);

    Ok(output)
}

/// Decrypt bytes produced by `encrypt_bytes`.
pub fn decrypt_bytes(ciphertext: &[u8], key: &[u8; KEY_SIZE]) -> CryptoResult<Vec<u8>> {
    if ciphertext.len() <= NONCE_SIZE {
        return Err(CryptoError::InvalidFormat("ciphertext too short".to_string()));
    }

    let (nonce_bytes, ct) = ciphertext.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(nonce, ct)
        .map_err(|e| CryptoError::InvalidFormat(format!("decryption failed: {e}")))
}

/// Encrypt bytes and return a Base64 string.
pub fn encrypt_to_base64(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> CryptoResult<String> {
    let encrypted = encrypt_bytes(plaintext, key)?;
    Ok(B64.encode(encrypted))
}

/// Decrypt a Base64 ciphertext previously produced by `encrypt_to_base64`.
pub fn decrypt_from_base64(ciphertext_b64: &str, key: &[u8; KEY_SIZE]) -> CryptoResult<Vec<u8>> {
    let decoded = B64
        .decode(ciphertext_b64.trim())
        .map_err(|e| CryptoError::InvalidFormat(format!("base64 decode failed: {e}")))?;
    decrypt_bytes(&decoded, key)
}
