//! Hybrid RSA + AES-CBC decryption of client request payloads.
//!
//! A client encrypts its parameters with a fresh AES key, wraps that key with the
//! gateway's RSA public key (PKCS#1 v1.5) and sends both base64-encoded:
//!
//! - `key`: `base64(RSA_PKCS1v15(aes_key))`, where `aes_key` is 16, 24 or 32 bytes;
//! - `data`: `base64(iv || AES_CBC(aes_key, iv, PKCS7(plaintext)))`, `iv` being 16 bytes.
//!
//! CBC carries no integrity check, so a tampered body can still unpad cleanly.
//! [`HybridDecryptor::decrypt_args`] additionally requires the plaintext to be a
//! JSON string map, which rejects such garbage before it reaches the gatekeeper.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// AES block size, which is also the IV length.
pub const AES_BLOCK_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("encrypted key is not valid base64: {0}")]
    KeyEncoding(#[source] base64::DecodeError),
    #[error("encrypted body is not valid base64: {0}")]
    BodyEncoding(#[source] base64::DecodeError),
    #[error("failed to read private key {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse PKCS#1 RSA private key: {0}")]
    KeyParse(#[source] rsa::pkcs1::Error),
    #[error("RSA decryption failed: {0}")]
    Rsa(#[source] rsa::Error),
    #[error("unsupported AES key length: {0} bytes")]
    AesKeyLength(usize),
    #[error("ciphertext of {0} bytes is not an IV followed by whole AES blocks")]
    CiphertextLength(usize),
    #[error("invalid padding in decrypted body")]
    Padding,
    #[error("decrypted payload is not a JSON string map: {0}")]
    Payload(#[source] serde_json::Error),
}

/// Encrypted request parameters as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Base64 `iv || ciphertext`.
    pub data: String,
    /// Base64 RSA-wrapped AES key.
    pub key: String,
}

/// Decrypts [`EncryptedPayload`]s with the RSA private key at `key_path`.
///
/// The key file is read on every call, so replacing it on disk takes effect
/// for the next request.
#[derive(Debug, Clone)]
pub struct HybridDecryptor {
    key_path: PathBuf,
}

impl HybridDecryptor {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            key_path: key_path.into(),
        }
    }

    /// Recover the plaintext bytes of `payload`.
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<Vec<u8>, DecryptError> {
        let wrapped_key = STANDARD
            .decode(payload.key.trim())
            .map_err(DecryptError::KeyEncoding)?;
        let private_key = load_private_key(&self.key_path)?;
        let aes_key = unwrap_aes_key(&private_key, &wrapped_key)?;

        let body = STANDARD
            .decode(payload.data.trim())
            .map_err(DecryptError::BodyEncoding)?;
        let plaintext = decrypt_aes_cbc(&body, &aes_key)?;

        debug!(bytes = plaintext.len(), "Decrypted request payload");
        Ok(plaintext)
    }

    /// Recover `payload` as a flag-to-value map.
    pub fn decrypt_args(
        &self,
        payload: &EncryptedPayload,
    ) -> Result<BTreeMap<String, String>, DecryptError> {
        let plaintext = self.decrypt(payload)?;
        serde_json::from_slice(&plaintext).map_err(DecryptError::Payload)
    }
}

/// Read and parse a PEM-encoded PKCS#1 RSA private key.
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey, DecryptError> {
    let pem = std::fs::read_to_string(path).map_err(|source| DecryptError::KeyFile {
        path: path.to_path_buf(),
        source,
    })?;
    RsaPrivateKey::from_pkcs1_pem(pem.trim()).map_err(DecryptError::KeyParse)
}

/// Decrypt an RSA PKCS#1 v1.5 wrapped AES key.
pub fn unwrap_aes_key(
    private_key: &RsaPrivateKey,
    wrapped_key: &[u8],
) -> Result<Vec<u8>, DecryptError> {
    private_key
        .decrypt_blinded(&mut rand::thread_rng(), Pkcs1v15Encrypt, wrapped_key)
        .map_err(DecryptError::Rsa)
}

/// Decrypt `iv || ciphertext` with AES-CBC and strip PKCS#7 padding.
///
/// The AES variant follows the key length (128, 192 or 256 bits).
pub fn decrypt_aes_cbc(body: &[u8], key: &[u8]) -> Result<Vec<u8>, DecryptError> {
    if body.len() < 2 * AES_BLOCK_SIZE || body.len() % AES_BLOCK_SIZE != 0 {
        return Err(DecryptError::CiphertextLength(body.len()));
    }
    let (iv, ciphertext) = body.split_at(AES_BLOCK_SIZE);

    let unpadded = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| DecryptError::AesKeyLength(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| DecryptError::AesKeyLength(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        32 => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| DecryptError::AesKeyLength(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext),
        other => return Err(DecryptError::AesKeyLength(other)),
    };

    unpadded.map_err(|_| DecryptError::Padding)
}
