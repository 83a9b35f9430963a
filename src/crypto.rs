//! Credential vault: authenticated symmetric encryption for externally
//! issued OAuth tokens at rest.
//!
//! AES-256-GCM with a fresh random 96-bit nonce per call; the nonce is
//! prepended to the returned ciphertext. Plaintext tokens exist only
//! transiently in memory after decryption — they are never persisted or
//! logged.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Required key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// The supplied key is not exactly 32 bytes.
    #[error("invalid encryption key")]
    InvalidKey,
    /// Ciphertext too short, tampered with, or sealed under a different
    /// key. The cases are deliberately indistinguishable.
    #[error("decryption failed")]
    DecryptionFailed,
}

/// Encrypts `plaintext` under a 32-byte key. A fresh random nonce is
/// generated per call and prepended to the returned ciphertext; the same
/// (key, nonce) pair is never reused as long as callers come through here.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKey);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let sealed = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Splits the leading nonce, then authenticates and decrypts the rest.
pub fn decrypt(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKey);
    }
    if ciphertext.len() < NONCE_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;

    let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, sealed)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Derives a valid 32-byte key from an operator-supplied passphrase of any
/// length. Deterministic: the same passphrase always yields the same key.
pub fn derive_key(passphrase: &str) -> [u8; KEY_LEN] {
    let digest = Sha256::digest(passphrase.as_bytes());
    digest.into()
}

/// Encrypts and base64-encodes the result, for contexts where ciphertext
/// must travel as text.
pub fn encrypt_to_base64(plaintext: &[u8], key: &[u8]) -> Result<String, CryptoError> {
    Ok(BASE64.encode(encrypt(plaintext, key)?))
}

/// Decodes base64 and decrypts. Invalid base64 counts as a failed
/// decryption.
pub fn decrypt_from_base64(encoded: &str, key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let ciphertext = BASE64
        .decode(encoded)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    decrypt(&ciphertext, key)
}
