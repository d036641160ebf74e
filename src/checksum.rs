//! Checksum algorithms selectable per archive.
//!
//! Header and TOC checksums are always CRC32.  Chunk payload checksums use
//! the algorithm named in the file header; only the low 32 bits are stored,
//! and they are computed over the *original plaintext* of the chunk — before
//! compression, before encryption.

use xxhash_rust::xxh3::{xxh3_128, xxh3_64};

/// Payload checksum selection, stored in file-header byte 0x0B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChecksumAlgorithm {
    Crc32   = 0,
    Xxh3_64 = 1,
    Xxh3_128 = 2,
}

impl ChecksumAlgorithm {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(ChecksumAlgorithm::Crc32),
            1 => Some(ChecksumAlgorithm::Xxh3_64),
            2 => Some(ChecksumAlgorithm::Xxh3_128),
            _ => None,
        }
    }

    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc32    => "crc32",
            ChecksumAlgorithm::Xxh3_64  => "xxh3-64",
            ChecksumAlgorithm::Xxh3_128 => "xxh3-128",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "crc32"    => Some(ChecksumAlgorithm::Crc32),
            "xxh3-64"  => Some(ChecksumAlgorithm::Xxh3_64),
            "xxh3-128" => Some(ChecksumAlgorithm::Xxh3_128),
            _ => None,
        }
    }

    /// Checksum of `data`, truncated to the low 32 bits for storage in the
    /// chunk header.
    pub fn checksum32(self, data: &[u8]) -> u32 {
        match self {
            ChecksumAlgorithm::Crc32    => crc32(data),
            ChecksumAlgorithm::Xxh3_64  => xxh3_64(data) as u32,
            ChecksumAlgorithm::Xxh3_128 => xxh3_128(data) as u32,
        }
    }
}

impl Default for ChecksumAlgorithm {
    fn default() -> Self {
        ChecksumAlgorithm::Crc32
    }
}

/// CRC32 (IEEE), used for every header and TOC checksum.
pub fn crc32(data: &[u8]) -> u32 {
    let mut h = crc32fast::Hasher::new();
    h.update(data);
    h.finalize()
}

/// The 32-bit name hash stored in TOC entries: XXH3-64 of the UTF-8 name,
/// truncated.  Collisions are acceptable — readers confirm the full string.
pub fn name_hash(name: &str) -> u32 {
    xxh3_64(name.as_bytes()) as u32
}
