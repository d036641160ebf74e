//! # apack — APACK container format reference implementation
//!
//! Format guarantees (frozen in format version 1):
//! - All numeric fields are little-endian; never negotiated
//! - Every structure is magic-tagged: `APACK\0`, `ENTR`, `CHNK`, `ENCR`,
//!   `ATRL`/`STRL` — and header CRC32s are mandatory, with no opt-out
//! - Chunk checksums cover the original plaintext, before compression and
//!   before encryption
//! - Algorithm identity is a frozen numeric id; readers that cannot supply
//!   a required id fail immediately — no fallback, no partial decode
//! - Wrong-password and tampered-ciphertext failures are indistinguishable
//! - The container trailer carries the TOC; stream archives are consumable
//!   linearly without it
//! - Reed–Solomon parity, when enabled, covers the stored chunk payload and
//!   is self-delimiting — no ECC metadata exists on disk

pub mod algo;
pub mod archive;
pub mod binio;
pub mod checksum;
pub mod chunk;
pub mod crypto;
pub mod ecc;
pub mod entry;
pub mod error;
pub mod header;
pub mod perf;
pub mod reader;
pub mod trailer;
pub mod verify;
pub mod writer;

// Flat re-exports for the most common types.
pub use archive::{create_archive, open_archive, Archive};
pub use checksum::ChecksumAlgorithm;
pub use ecc::{EccOptions, RsCodec};
pub use entry::{AttrValue, Entry};
pub use error::{Error, Result};
pub use reader::{ApackReader, EntryReader, OpenOptions};
pub use verify::{verify_archive, ArchiveQuality, EntryHealth, VerifyReport};
pub use writer::{
    ApackWriter, ArchiveMode, ArchiveOptions, CompressionOptions, EncryptionOptions, EntryStream,
};
