//! Chunk header and the per-chunk processing pipeline.
//!
//! # On-disk layout (24-byte header, all fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!   00      4   magic          = "CHNK"
//!   04      4   chunk_index    0-based, sequential within the entry
//!   08      4   original_size  plaintext bytes
//!   0C      4   stored_size    on-disk payload bytes
//!   10      4   checksum       low 32 bits of H(plaintext)
//!   14      4   flags          0x01=LAST 0x02=COMPRESSED 0x04=ENCRYPTED
//! ```
//!
//! # Pipeline order
//! Write: checksum the plaintext, compress (kept only when smaller),
//! encrypt, Reed–Solomon-encode, store.  Read inverts the chain and
//! verifies the plaintext checksum last.  The checksum therefore always
//! covers the original bytes, independent of every other stage.

use std::io::{Read, Write};
use std::sync::Arc;

use crate::algo::{self, CompressionProvider, EncryptionProvider};
use crate::checksum::ChecksumAlgorithm;
use crate::crypto::Dek;
use crate::ecc::RsCodec;
use crate::error::{Error, Result, OPAQUE_CRYPTO_FAILURE};

pub const CHUNK_MAGIC: &[u8; 4] = b"CHNK";
pub const CHUNK_HEADER_SIZE: usize = 24;

pub const CHUNK_FLAG_LAST: u32 = 0x01;
pub const CHUNK_FLAG_COMPRESSED: u32 = 0x02;
pub const CHUNK_FLAG_ENCRYPTED: u32 = 0x04;

// ── Chunk header ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_index:   u32,
    pub original_size: u32,
    pub stored_size:   u32,
    pub checksum:      u32,
    pub flags:         u32,
}

impl ChunkHeader {
    #[inline]
    pub fn is_last(&self) -> bool {
        self.flags & CHUNK_FLAG_LAST != 0
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.flags & CHUNK_FLAG_COMPRESSED != 0
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.flags & CHUNK_FLAG_ENCRYPTED != 0
    }

    pub fn to_bytes(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        buf[..4].copy_from_slice(CHUNK_MAGIC);
        buf[4..8].copy_from_slice(&self.chunk_index.to_le_bytes());
        buf[8..12].copy_from_slice(&self.original_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.stored_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf[20..24].copy_from_slice(&self.flags.to_le_bytes());
        buf
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&self.to_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        r.read_exact(&mut buf).map_err(Error::from_read)?;
        if &buf[..4] != CHUNK_MAGIC {
            return Err(Error::InvalidFormat("missing chunk header magic".into()));
        }
        Ok(Self {
            chunk_index:   u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            original_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            stored_size:   u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            checksum:      u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            flags:         u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        })
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// The only component that interleaves checksum, compression, encryption,
/// and ECC.  One pipeline serves one archive session; it owns the session
/// DEK when encryption is active.
pub struct ChunkPipeline {
    checksum_alg: ChecksumAlgorithm,
    compression:  Option<(Arc<dyn CompressionProvider>, i32)>,
    encryption:   Option<(Arc<dyn EncryptionProvider>, Dek)>,
    ecc:          Option<RsCodec>,
}

impl ChunkPipeline {
    pub fn new(checksum_alg: ChecksumAlgorithm) -> Self {
        Self {
            checksum_alg,
            compression: None,
            encryption:  None,
            ecc:         None,
        }
    }

    pub fn with_compression(
        mut self,
        provider: Arc<dyn CompressionProvider>,
        level: i32,
    ) -> Self {
        self.compression = Some((provider, level));
        self
    }

    pub fn with_encryption(mut self, provider: Arc<dyn EncryptionProvider>, dek: Dek) -> Self {
        self.encryption = Some((provider, dek));
        self
    }

    pub fn with_ecc(mut self, codec: RsCodec) -> Self {
        self.ecc = Some(codec);
        self
    }

    /// Install encryption after construction (reader unlock path).
    pub(crate) fn set_encryption(&mut self, provider: Arc<dyn EncryptionProvider>, dek: Dek) {
        self.encryption = Some((provider, dek));
    }

    #[inline]
    pub fn has_encryption(&self) -> bool {
        self.encryption.is_some()
    }

    #[inline]
    pub fn has_ecc(&self) -> bool {
        self.ecc.is_some()
    }

    // ── Write side ──────────────────────────────────────────────────────────

    /// Transform one plaintext chunk into its header and stored payload.
    pub fn encode(&self, chunk_index: u32, data: &[u8], last: bool) -> Result<(ChunkHeader, Vec<u8>)> {
        let checksum = self.checksum_alg.checksum32(data);
        let mut flags = if last { CHUNK_FLAG_LAST } else { 0 };

        let mut payload = data.to_vec();
        if let Some((provider, level)) = &self.compression {
            if !data.is_empty() {
                let compressed = provider.compress(data, *level)?;
                if compressed.len() < data.len() {
                    payload = compressed;
                    flags |= CHUNK_FLAG_COMPRESSED;
                }
            }
        }
        if let Some((provider, dek)) = &self.encryption {
            payload = provider.encrypt(dek.expose(), &payload)?;
            flags |= CHUNK_FLAG_ENCRYPTED;
        }
        if let Some(codec) = &self.ecc {
            payload = codec.encode_blob(&payload)?;
        }

        let header = ChunkHeader {
            chunk_index,
            original_size: data.len() as u32,
            stored_size:   payload.len() as u32,
            checksum,
            flags,
        };
        Ok((header, payload))
    }

    // ── Read side ───────────────────────────────────────────────────────────

    /// Invert [`encode`](Self::encode): ECC-repair, decrypt, decompress,
    /// verify the plaintext checksum.
    ///
    /// `compression_id` comes from the entry header; `ecc` tells whether
    /// this entry's payloads carry parity.
    pub fn decode(
        &self,
        header: &ChunkHeader,
        stored: &[u8],
        compression_id: u8,
        ecc: bool,
    ) -> Result<Vec<u8>> {
        let mut payload = stored.to_vec();

        if ecc {
            let codec = self.ecc.as_ref().ok_or_else(|| {
                Error::InvalidFormat(
                    "entry carries error-correction parity but no ECC configuration was given"
                        .into(),
                )
            })?;
            payload = codec.decode_blob(&payload)?;
        }

        if header.is_encrypted() {
            let (provider, dek) = self.encryption.as_ref().ok_or(Error::DecryptionFailed)?;
            payload = provider.decrypt(dek.expose(), &payload)?;
        }

        if header.is_compressed() {
            let provider = algo::require_compression_by_id(compression_id)?;
            payload = provider.decompress(&payload)?;
        }

        if payload.len() != header.original_size as usize {
            return Err(self.integrity_error(header));
        }
        if self.checksum_alg.checksum32(&payload) != header.checksum {
            return Err(self.integrity_error(header));
        }
        Ok(payload)
    }

    /// Checksum-mismatch error.  For encrypted chunks the message is the
    /// shared opaque one, so a post-decrypt mismatch reads exactly like a
    /// wrong password.
    fn integrity_error(&self, header: &ChunkHeader) -> Error {
        if header.is_encrypted() {
            Error::IntegrityFailure(OPAQUE_CRYPTO_FAILURE.into())
        } else {
            Error::IntegrityFailure(format!(
                "chunk {} checksum mismatch",
                header.chunk_index
            ))
        }
    }
}
