//! Key hierarchy: password → KDF → KEK → AES Key Wrap → DEK.
//!
//! # Write path
//! A random 256-bit DEK and a random 32-byte salt are generated; the KEK is
//! derived from the password and salt via the selected KDF; the DEK is
//! wrapped with AES Key Wrap (RFC 3394) under the KEK; the resulting
//! [`EncryptionRecord`] is persisted as the ENCR block right after the file
//! header.  The DEK then drives every chunk AEAD operation of the session.
//!
//! # Read path
//! The stored record reconstructs the KDF from its parameters, derives the
//! KEK from the supplied password and stored salt, and unwraps the DEK.
//! Unwrap failure carries the same message for a wrong password and for
//! corrupted data.
//!
//! # Key hygiene
//! The KEK lives only for the duration of the wrap or unwrap call; the DEK
//! lives for the archive session.  Both are zeroed on every exit path.
//!
//! # On-disk layout of the ENCR block (variable length)
//!
//! ```text
//! Offset  Size  Field
//!   00      4   magic            = "ENCR"
//!   04      1   kdf_alg          0=Argon2id  1=PBKDF2-HMAC-SHA256
//!   05      1   cipher_alg       1=AES-256-GCM  2=ChaCha20-Poly1305
//!   06      2   reserved         (zero)
//!   08      4   kdf_iterations   (LE i32)
//!   0C      4   kdf_memory_kib   (LE i32, zero for PBKDF2)
//!   10      4   kdf_parallelism  (LE i32, zero for PBKDF2)
//!   14      2   salt_len         (LE u16)
//!   16      2   wrapped_key_len  (LE u16)
//!   18      …   salt
//!   …       …   wrapped_key      RFC 3394 ciphertext (40 B for a 256-bit DEK)
//!   …      16   wrap_tag         SHA-256(wrapped_key) truncated to 16 bytes
//! ```

pub mod key_wrap;
mod keys;

pub use keys::Dek;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::algo::{self, KdfParams};
use crate::binio::{ByteReader, ByteWriter};
use crate::error::{Error, Result};

use std::io::{Read, Write};

pub const ENCRYPTION_BLOCK_MAGIC: &[u8; 4] = b"ENCR";

/// Salt length written by this implementation.  Readers accept any stored
/// length of at least [`MIN_SALT_LEN`].
pub const SALT_LEN: usize = 32;
pub const MIN_SALT_LEN: usize = 16;

/// Byte length of the wrap verification tag.
pub const WRAP_TAG_LEN: usize = 16;

/// The persisted encryption record.
#[derive(Debug, Clone)]
pub struct EncryptionRecord {
    pub kdf_id:      u8,
    pub cipher_id:   u8,
    pub params:      KdfParams,
    pub salt:        Vec<u8>,
    pub wrapped_key: Vec<u8>,
    pub wrap_tag:    [u8; WRAP_TAG_LEN],
}

impl EncryptionRecord {
    /// Generate a fresh DEK, wrap it under a password-derived KEK, and
    /// return both the record and the session DEK.
    pub fn create(
        password: &str,
        kdf_id: u8,
        cipher_id: u8,
        params: KdfParams,
    ) -> Result<(Self, Dek)> {
        let kdf = algo::require_kdf_by_id(kdf_id)?;
        algo::require_encryption_by_id(cipher_id)?;

        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let dek = Dek::generate();
        let kek = kdf.derive_key(password.as_bytes(), &salt, &params)?;
        let wrapped_key = key_wrap::wrap(&kek, dek.expose())?;
        let wrap_tag = wrap_tag_of(&wrapped_key);

        Ok((
            Self {
                kdf_id,
                cipher_id,
                params,
                salt,
                wrapped_key,
                wrap_tag,
            },
            dek,
        ))
    }

    /// Derive the KEK from `password` and unwrap the session DEK.
    ///
    /// Every failure mode past algorithm resolution — tag mismatch,
    /// integrity-check failure, wrong wrapped length — reports the same
    /// [`Error::DecryptionFailed`].
    pub fn unwrap_dek(&self, password: &str) -> Result<Dek> {
        if wrap_tag_of(&self.wrapped_key) != self.wrap_tag {
            return Err(Error::DecryptionFailed);
        }

        let kdf = algo::require_kdf_by_id(self.kdf_id)?;
        let kek = kdf.derive_key(password.as_bytes(), &self.salt, &self.params)?;

        let mut raw = key_wrap::unwrap(&kek, &self.wrapped_key)?;
        if raw.len() != 32 {
            raw.zeroize();
            return Err(Error::DecryptionFailed);
        }
        let mut bytes = Zeroizing::new([0u8; 32]);
        bytes.copy_from_slice(&raw);
        raw.zeroize();
        Ok(Dek::from_bytes(bytes))
    }

    /// Total byte length of the serialized block.
    pub fn wire_len(&self) -> u64 {
        0x18 + self.salt.len() as u64 + self.wrapped_key.len() as u64 + WRAP_TAG_LEN as u64
    }

    pub fn write_to<W: Write>(&self, w: &mut ByteWriter<W>) -> Result<()> {
        if self.salt.len() > u16::MAX as usize {
            return Err(Error::ValueTooLarge("encryption salt".into()));
        }
        if self.wrapped_key.len() > u16::MAX as usize {
            return Err(Error::ValueTooLarge("wrapped key".into()));
        }
        w.write_bytes(ENCRYPTION_BLOCK_MAGIC)?;
        w.write_u8(self.kdf_id)?;
        w.write_u8(self.cipher_id)?;
        w.write_u16(0)?;
        w.write_i32(self.params.iterations)?;
        w.write_i32(self.params.memory_kib)?;
        w.write_i32(self.params.parallelism)?;
        w.write_u16(self.salt.len() as u16)?;
        w.write_u16(self.wrapped_key.len() as u16)?;
        w.write_bytes(&self.salt)?;
        w.write_bytes(&self.wrapped_key)?;
        w.write_bytes(&self.wrap_tag)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut ByteReader<R>) -> Result<Self> {
        r.expect_magic(ENCRYPTION_BLOCK_MAGIC, "encryption block")?;
        let kdf_id = r.read_u8()?;
        let cipher_id = r.read_u8()?;
        let _reserved = r.read_u16()?;
        let params = KdfParams {
            iterations:  r.read_i32()?,
            memory_kib:  r.read_i32()?,
            parallelism: r.read_i32()?,
        };
        let salt_len = r.read_u16()? as usize;
        let wrapped_key_len = r.read_u16()? as usize;
        if salt_len < MIN_SALT_LEN {
            return Err(Error::InvalidFormat(format!(
                "encryption salt of {salt_len} bytes is below the {MIN_SALT_LEN}-byte minimum"
            )));
        }
        let salt = r.read_exact_vec(salt_len)?;
        let wrapped_key = r.read_exact_vec(wrapped_key_len)?;
        let mut wrap_tag = [0u8; WRAP_TAG_LEN];
        r.read_exact_buf(&mut wrap_tag)?;
        Ok(Self {
            kdf_id,
            cipher_id,
            params,
            salt,
            wrapped_key,
            wrap_tag,
        })
    }
}

/// Wrap verification tag: SHA-256 of the wrapped-key bytes, truncated.
/// Detects record corruption before the expensive KDF runs; a mismatch is
/// reported exactly like a wrong password.
fn wrap_tag_of(wrapped: &[u8]) -> [u8; WRAP_TAG_LEN] {
    let digest = ring::digest::digest(&ring::digest::SHA256, wrapped);
    let mut tag = [0u8; WRAP_TAG_LEN];
    tag.copy_from_slice(&digest.as_ref()[..WRAP_TAG_LEN]);
    tag
}
