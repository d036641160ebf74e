//! Archive trailers and the table of contents.
//!
//! # Container trailer (64-byte header followed by the TOC)
//!
//! ```text
//! Offset  Size  Field
//!   00      4   magic               = "ATRL"
//!   04      4   trailer_version     (LE i32)
//!   08      8   toc_offset          (LE i64, absolute)
//!   10      8   toc_size            (LE i64, bytes)
//!   18      8   entry_count         (LE i64)
//!   20      8   total_original_size (LE i64)
//!   28      8   total_stored_size   (LE i64)
//!   30      4   toc_checksum        CRC32 of all TOC records (LE u32)
//!   34      4   trailer_checksum    CRC32 of this header with this
//!                                   field zeroed (LE u32)
//!   38      8   file_size           (LE i64, total archive length)
//!   40    40×n  toc_entries
//! ```
//!
//! # Stream trailer (32 bytes)
//!
//! ```text
//!   00 "STRL" | 04 reserved i32 | 08 original_size i64 | 10 stored_size i64
//!   18 chunk_count i32 | 1C trailer_checksum u32 (header with field zeroed)
//! ```
//!
//! A TOC record is 40 bytes:
//! `{id u64, entry_offset u64, original_size u64, stored_size u64,
//!   name_hash u32, entry_checksum u32}`.  TOC ordering mirrors entry
//! emission order.

use std::io::{Read, Write};

use crate::checksum::crc32;
use crate::error::{Error, Result};

pub const CONTAINER_TRAILER_MAGIC: &[u8; 4] = b"ATRL";
pub const STREAM_TRAILER_MAGIC: &[u8; 4] = b"STRL";
pub const CONTAINER_TRAILER_SIZE: usize = 64;
pub const STREAM_TRAILER_SIZE: usize = 32;
pub const TOC_ENTRY_SIZE: usize = 40;
pub const TRAILER_VERSION: i32 = 1;

// ── TOC entry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocEntry {
    pub id:             u64,
    pub entry_offset:   u64,
    pub original_size:  u64,
    pub stored_size:    u64,
    /// XXH3 of the UTF-8 name, truncated to 32 bits.  Collisions are legal;
    /// lookups confirm the full name from the entry header.
    pub name_hash:      u32,
    /// The entry header's own checksum, copied for cross-validation.
    pub entry_checksum: u32,
}

impl TocEntry {
    pub fn to_bytes(&self) -> [u8; TOC_ENTRY_SIZE] {
        let mut buf = [0u8; TOC_ENTRY_SIZE];
        buf[..8].copy_from_slice(&self.id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.entry_offset.to_le_bytes());
        buf[16..24].copy_from_slice(&self.original_size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.stored_size.to_le_bytes());
        buf[32..36].copy_from_slice(&self.name_hash.to_le_bytes());
        buf[36..40].copy_from_slice(&self.entry_checksum.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; TOC_ENTRY_SIZE]) -> Self {
        Self {
            id:             u64::from_le_bytes(buf[..8].try_into().unwrap()),
            entry_offset:   u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            original_size:  u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            stored_size:    u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            name_hash:      u32::from_le_bytes(buf[32..36].try_into().unwrap()),
            entry_checksum: u32::from_le_bytes(buf[36..40].try_into().unwrap()),
        }
    }
}

/// CRC32 over the concatenated 40-byte TOC records.
pub fn toc_checksum(entries: &[TocEntry]) -> u32 {
    let mut h = crc32fast::Hasher::new();
    for e in entries {
        h.update(&e.to_bytes());
    }
    h.finalize()
}

// ── Container trailer ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ContainerTrailer {
    pub trailer_version:     i32,
    pub toc_offset:          i64,
    pub toc_size:            i64,
    pub entry_count:         i64,
    pub total_original_size: i64,
    pub total_stored_size:   i64,
    pub toc_checksum:        u32,
    pub file_size:           i64,
}

impl ContainerTrailer {
    pub fn to_bytes(&self) -> [u8; CONTAINER_TRAILER_SIZE] {
        let mut buf = [0u8; CONTAINER_TRAILER_SIZE];
        buf[..4].copy_from_slice(CONTAINER_TRAILER_MAGIC);
        buf[4..8].copy_from_slice(&self.trailer_version.to_le_bytes());
        buf[8..16].copy_from_slice(&self.toc_offset.to_le_bytes());
        buf[16..24].copy_from_slice(&self.toc_size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[32..40].copy_from_slice(&self.total_original_size.to_le_bytes());
        buf[40..48].copy_from_slice(&self.total_stored_size.to_le_bytes());
        buf[48..52].copy_from_slice(&self.toc_checksum.to_le_bytes());
        // 52..56 = trailer_checksum, zero while hashing
        buf[56..64].copy_from_slice(&self.file_size.to_le_bytes());
        let crc = crc32(&buf);
        buf[52..56].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Write the trailer header followed by the TOC records.
    pub fn write_to<W: Write>(&self, mut w: W, toc: &[TocEntry]) -> Result<()> {
        w.write_all(&self.to_bytes())?;
        for e in toc {
            w.write_all(&e.to_bytes())?;
        }
        Ok(())
    }

    /// Read and validate the 64-byte trailer header (not the TOC).
    pub fn read_from<R: Read>(mut r: R) -> Result<Self> {
        let mut buf = [0u8; CONTAINER_TRAILER_SIZE];
        r.read_exact(&mut buf).map_err(Error::from_read)?;
        if &buf[..4] != CONTAINER_TRAILER_MAGIC {
            return Err(Error::InvalidFormat("missing container trailer magic".into()));
        }

        let stored_crc = u32::from_le_bytes(buf[52..56].try_into().unwrap());
        let mut zeroed = buf;
        zeroed[52..56].fill(0);
        if crc32(&zeroed) != stored_crc {
            return Err(Error::IntegrityFailure(
                "container trailer checksum mismatch".into(),
            ));
        }

        Ok(Self {
            trailer_version:     i32::from_le_bytes(buf[4..8].try_into().unwrap()),
            toc_offset:          i64::from_le_bytes(buf[8..16].try_into().unwrap()),
            toc_size:            i64::from_le_bytes(buf[16..24].try_into().unwrap()),
            entry_count:         i64::from_le_bytes(buf[24..32].try_into().unwrap()),
            total_original_size: i64::from_le_bytes(buf[32..40].try_into().unwrap()),
            total_stored_size:   i64::from_le_bytes(buf[40..48].try_into().unwrap()),
            toc_checksum:        stored_crc_toc(&buf),
            file_size:           i64::from_le_bytes(buf[56..64].try_into().unwrap()),
        })
    }
}

#[inline]
fn stored_crc_toc(buf: &[u8; CONTAINER_TRAILER_SIZE]) -> u32 {
    u32::from_le_bytes(buf[48..52].try_into().unwrap())
}

// ── Stream trailer ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StreamTrailer {
    pub original_size: i64,
    pub stored_size:   i64,
    pub chunk_count:   i32,
}

impl StreamTrailer {
    pub fn to_bytes(&self) -> [u8; STREAM_TRAILER_SIZE] {
        let mut buf = [0u8; STREAM_TRAILER_SIZE];
        buf[..4].copy_from_slice(STREAM_TRAILER_MAGIC);
        // 04..08 reserved
        buf[8..16].copy_from_slice(&self.original_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.stored_size.to_le_bytes());
        buf[24..28].copy_from_slice(&self.chunk_count.to_le_bytes());
        // 28..32 = trailer_checksum, zero while hashing
        let crc = crc32(&buf);
        buf[28..32].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<()> {
        w.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Parse a stream trailer whose 4-byte magic was already consumed by
    /// the linear scan.
    pub fn read_after_magic<R: Read>(mut r: R) -> Result<Self> {
        let mut buf = [0u8; STREAM_TRAILER_SIZE];
        buf[..4].copy_from_slice(STREAM_TRAILER_MAGIC);
        r.read_exact(&mut buf[4..]).map_err(Error::from_read)?;

        let stored_crc = u32::from_le_bytes(buf[28..32].try_into().unwrap());
        let mut zeroed = buf;
        zeroed[28..32].fill(0);
        if crc32(&zeroed) != stored_crc {
            return Err(Error::IntegrityFailure("stream trailer checksum mismatch".into()));
        }

        Ok(Self {
            original_size: i64::from_le_bytes(buf[8..16].try_into().unwrap()),
            stored_size:   i64::from_le_bytes(buf[16..24].try_into().unwrap()),
            chunk_count:   i32::from_le_bytes(buf[24..28].try_into().unwrap()),
        })
    }
}
