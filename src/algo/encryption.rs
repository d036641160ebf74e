//! Built-in AEAD providers: AES-256-GCM and ChaCha20-Poly1305.
//!
//! Encrypted payload layout: `nonce (12 B) ‖ ciphertext ‖ tag (16 B)`.
//! A fresh random nonce is drawn per payload.  Every decryption failure —
//! truncated payload, bad tag, wrong key — surfaces as the uniform
//! [`Error::DecryptionFailed`] so callers cannot distinguish a wrong
//! password from tampered ciphertext.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;

use crate::error::{Error, Result};

use super::{EncryptionProvider, ENCRYPTION_AES256_GCM, ENCRYPTION_CHACHA20};

/// Byte length of the nonce prepended to every encrypted payload.
pub const NONCE_LEN: usize = 12;
/// Byte length of the authentication tag appended by both ciphers.
pub const TAG_LEN: usize = 16;

pub struct Aes256GcmProvider;

impl EncryptionProvider for Aes256GcmProvider {
    fn numeric_id(&self) -> u8 {
        ENCRYPTION_AES256_GCM
    }

    fn name(&self) -> &'static str {
        "aes-256-gcm"
    }

    fn encrypt(&self, key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::DecryptionFailed)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| Error::DecryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, key: &[u8; 32], payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::DecryptionFailed);
        }
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::DecryptionFailed)?;
        let nonce = aes_gcm::Nonce::from_slice(&payload[..NONCE_LEN]);
        cipher
            .decrypt(nonce, &payload[NONCE_LEN..])
            .map_err(|_| Error::DecryptionFailed)
    }
}

pub struct ChaCha20Poly1305Provider;

impl EncryptionProvider for ChaCha20Poly1305Provider {
    fn numeric_id(&self) -> u8 {
        ENCRYPTION_CHACHA20
    }

    fn name(&self) -> &'static str {
        "chacha20-poly1305"
    }

    fn encrypt(&self, key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher =
            ChaCha20Poly1305::new_from_slice(key).map_err(|_| Error::DecryptionFailed)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| Error::DecryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, key: &[u8; 32], payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::DecryptionFailed);
        }
        let cipher =
            ChaCha20Poly1305::new_from_slice(key).map_err(|_| Error::DecryptionFailed)?;
        let nonce = chacha20poly1305::Nonce::from_slice(&payload[..NONCE_LEN]);
        cipher
            .decrypt(nonce, &payload[NONCE_LEN..])
            .map_err(|_| Error::DecryptionFailed)
    }
}
