//! File header — format anchor at offset 0.
//!
//! # On-disk layout (64 bytes, all fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!   00      6   magic                 = "APACK\0"
//!   06      1   ver_major             = 1
//!   07      1   ver_minor             = 0
//!   08      1   ver_patch             = 0
//!   09      1   compat_level          = 1
//!   0A      1   mode_flags            see MODE_* bits
//!   0B      1   checksum_alg          0=CRC32 1=XXH3-64 2=XXH3-128
//!   0C      4   chunk_size            (LE i32, bytes)
//!   10      4   header_checksum       CRC32 of bytes 00..10 (LE u32)
//!   14      8   entry_count           (LE i64, patched on close)
//!   1C      8   trailer_offset        (LE i64, patched on close)
//!   24      8   creation_timestamp_ms (LE i64, Unix millis)
//!   2C     20   reserved              (zero)
//! ```
//!
//! `entry_count` and `trailer_offset` are written as zero at `create` time
//! and patched in place by `close()`.  `header_checksum` covers the first
//! 16 bytes only, so the patch does not invalidate it.

use chrono::Utc;
use std::io::Read;

use crate::binio::{ByteReader, FILE_MAGIC};
use crate::checksum::{crc32, ChecksumAlgorithm};
use crate::error::{Error, Result};

pub const FILE_HEADER_SIZE: usize = 64;

pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;
pub const VERSION_PATCH: u8 = 0;

/// Compat level written by this build.
pub const COMPAT_LEVEL: u8 = 1;
/// Highest compat level this build can read.
pub const MAX_SUPPORTED_COMPAT: u8 = 1;

// ── Mode flag bits ───────────────────────────────────────────────────────────

/// Entries are laid out for linear consumption; no TOC is written.
pub const MODE_STREAM: u8 = 0x01;
/// An encryption block immediately follows the file header.
pub const MODE_ENCRYPTED: u8 = 0x02;
/// A compression algorithm is configured (individual chunks may still be
/// stored raw when compression does not pay off).
pub const MODE_COMPRESSED: u8 = 0x04;
/// Container layout with a trailer-resident TOC for random access.
pub const MODE_RANDOM_ACCESS: u8 = 0x08;

// ── Chunk size limits ────────────────────────────────────────────────────────

pub const MIN_CHUNK_SIZE: u32 = 1024;
pub const MAX_CHUNK_SIZE: u32 = 64 * 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE: u32 = 256 * 1024;

#[derive(Debug, Clone)]
pub struct FileHeader {
    pub ver_major:    u8,
    pub ver_minor:    u8,
    pub ver_patch:    u8,
    pub compat_level: u8,
    pub mode_flags:   u8,
    pub checksum_alg: u8,
    pub chunk_size:   u32,
    pub entry_count:  i64,
    pub trailer_offset: i64,
    pub creation_timestamp_ms: i64,
}

impl FileHeader {
    pub fn new(mode_flags: u8, checksum: ChecksumAlgorithm, chunk_size: u32) -> Self {
        Self {
            ver_major:    VERSION_MAJOR,
            ver_minor:    VERSION_MINOR,
            ver_patch:    VERSION_PATCH,
            compat_level: COMPAT_LEVEL,
            mode_flags,
            checksum_alg: checksum.id(),
            chunk_size,
            entry_count:  0,
            trailer_offset: 0,
            creation_timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    #[inline]
    pub fn is_stream(&self) -> bool {
        self.mode_flags & MODE_STREAM != 0
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.mode_flags & MODE_ENCRYPTED != 0
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.mode_flags & MODE_COMPRESSED != 0
    }

    pub fn checksum_algorithm(&self) -> Result<ChecksumAlgorithm> {
        ChecksumAlgorithm::from_id(self.checksum_alg).ok_or(Error::UnknownAlgorithm {
            kind: "checksum",
            id:   self.checksum_alg.to_string(),
        })
    }

    /// Serialize to exactly 64 bytes, computing `header_checksum`.
    pub fn to_bytes(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[..6].copy_from_slice(FILE_MAGIC);
        buf[6] = self.ver_major;
        buf[7] = self.ver_minor;
        buf[8] = self.ver_patch;
        buf[9] = self.compat_level;
        buf[10] = self.mode_flags;
        buf[11] = self.checksum_alg;
        buf[12..16].copy_from_slice(&(self.chunk_size as i32).to_le_bytes());
        let crc = crc32(&buf[..16]);
        buf[16..20].copy_from_slice(&crc.to_le_bytes());
        buf[20..28].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[28..36].copy_from_slice(&self.trailer_offset.to_le_bytes());
        buf[36..44].copy_from_slice(&self.creation_timestamp_ms.to_le_bytes());
        // bytes 44..64 reserved, zero
        buf
    }

    /// Read and fully validate a file header.
    ///
    /// Validation order: magic, header checksum, compat level, mode flag
    /// exclusivity, checksum id, chunk size range.
    pub fn read_from<R: Read>(r: &mut ByteReader<R>) -> Result<Self> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        r.read_exact_buf(&mut buf)?;

        if &buf[..6] != FILE_MAGIC {
            return Err(Error::InvalidFormat("not an APACK archive".into()));
        }

        let stored_crc = u32::from_le_bytes(buf[16..20].try_into().unwrap());
        if crc32(&buf[..16]) != stored_crc {
            return Err(Error::IntegrityFailure(
                "file header checksum mismatch — archive is corrupted".into(),
            ));
        }

        let header = Self {
            ver_major:    buf[6],
            ver_minor:    buf[7],
            ver_patch:    buf[8],
            compat_level: buf[9],
            mode_flags:   buf[10],
            checksum_alg: buf[11],
            chunk_size:   i32::from_le_bytes(buf[12..16].try_into().unwrap()) as u32,
            entry_count:  i64::from_le_bytes(buf[20..28].try_into().unwrap()),
            trailer_offset: i64::from_le_bytes(buf[28..36].try_into().unwrap()),
            creation_timestamp_ms: i64::from_le_bytes(buf[36..44].try_into().unwrap()),
        };

        if header.compat_level > MAX_SUPPORTED_COMPAT {
            return Err(Error::UnsupportedVersion {
                required:  header.compat_level,
                supported: MAX_SUPPORTED_COMPAT,
            });
        }
        if header.is_stream() && header.mode_flags & MODE_RANDOM_ACCESS != 0 {
            return Err(Error::InvalidFormat(
                "stream and random-access mode flags are mutually exclusive".into(),
            ));
        }
        header.checksum_algorithm()?;
        validate_chunk_size(header.chunk_size)?;
        Ok(header)
    }
}

pub fn validate_chunk_size(chunk_size: u32) -> Result<()> {
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(Error::ValueTooLarge(format!(
            "chunk size {chunk_size} outside [{MIN_CHUNK_SIZE}, {MAX_CHUNK_SIZE}]"
        )));
    }
    Ok(())
}
