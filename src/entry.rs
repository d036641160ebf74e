//! Logical entry model and its on-disk header.
//!
//! # On-disk layout
//!
//! ```text
//! Fixed prefix (48 bytes):
//!   00  magic "ENTR" (4) | 04 hdr_version u8 | 05 flags u8 | 06 reserved u16
//!   08  entry_id i64 | 10 original_size i64 | 18 stored_size i64
//!   20  chunk_count i32 | 24 compression_id u8 | 25 encryption_id u8
//!   26  name_len u16 | 28 mime_len u16 | 2A attr_count u16
//!   2C  header_checksum u32
//! Variable tail:
//!   name (name_len UTF-8 bytes)
//!   mime_type (mime_len UTF-8 bytes)
//!   attributes (attr_count records)
//!   zero padding to the next 8-byte boundary relative to the entry start
//! ```
//!
//! An attribute record is
//! `{key_len u16, value_type u8, value_len i32, key_bytes, value_bytes}`.
//!
//! `header_checksum` is CRC32 over the fixed prefix up to (but excluding)
//! the checksum field, concatenated with the tail before padding.  The
//! header is written twice: provisionally when the entry opens, and again —
//! same length — with final sizes when its stream closes.

use std::io::{Read, Write};

use crate::binio::{ByteReader, ByteWriter};
use crate::error::{Error, Result};

pub const ENTRY_MAGIC: &[u8; 4] = b"ENTR";
pub const ENTRY_HEADER_VERSION: u8 = 1;
pub const ENTRY_FIXED_SIZE: usize = 48;
pub const ENTRY_ALIGN: u64 = 8;

/// Entry flag: chunk payloads carry Reed–Solomon parity.
pub const ENTRY_FLAG_ECC: u8 = 0x01;

pub const MAX_NAME_LEN: usize = 65_535;
pub const MAX_MIME_LEN: usize = 255;
pub const MAX_ATTR_COUNT: usize = 65_535;

// ── Attribute values ─────────────────────────────────────────────────────────

/// A typed attribute value.  The numeric tag is frozen on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    String(String),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl AttrValue {
    pub fn type_id(&self) -> u8 {
        match self {
            AttrValue::String(_)  => 0,
            AttrValue::Int64(_)   => 1,
            AttrValue::Float64(_) => 2,
            AttrValue::Bool(_)    => 3,
            AttrValue::Bytes(_)   => 4,
        }
    }

    fn value_len(&self) -> usize {
        match self {
            AttrValue::String(s) => s.len(),
            AttrValue::Int64(_) | AttrValue::Float64(_) => 8,
            AttrValue::Bool(_)  => 1,
            AttrValue::Bytes(b) => b.len(),
        }
    }
}

// ── Entry ────────────────────────────────────────────────────────────────────

/// A named unit of data within an archive.
///
/// Callers construct one with [`Entry::new`] and hand it to the writer; the
/// size fields and `chunk_count` are populated during the write.  On the
/// read side an `Entry` is materialized from its header when first
/// referenced and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Unique within the archive.  Zero on input means "auto-assign"
    /// (sequential, starting at 1).
    pub id:             u64,
    pub name:           String,
    pub mime_type:      String,
    pub attributes:     Vec<(String, AttrValue)>,
    pub compression_id: u8,
    pub encryption_id:  u8,
    pub has_ecc:        bool,
    pub original_size:  u64,
    pub stored_size:    u64,
    pub chunk_count:    u32,
    /// Absolute offset of the `ENTR` magic; set when the entry touches disk.
    pub(crate) entry_offset: u64,
    /// Absolute offset of the first chunk header.
    pub(crate) data_offset:  u64,
}

impl Entry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id:             0,
            name:           name.into(),
            mime_type:      String::new(),
            attributes:     Vec::new(),
            compression_id: 0,
            encryption_id:  0,
            has_ecc:        false,
            original_size:  0,
            stored_size:    0,
            chunk_count:    0,
            entry_offset:   0,
            data_offset:    0,
        }
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = mime.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attributes.push((key.into(), value));
        self
    }

    /// First attribute with the given key, if any.
    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Enforce the format limits on caller-supplied metadata.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidFormat("entry name must not be empty".into()));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(Error::ValueTooLarge(format!(
                "entry name of {} bytes exceeds {MAX_NAME_LEN}",
                self.name.len()
            )));
        }
        if self.name.as_bytes().contains(&0) {
            return Err(Error::InvalidFormat(
                "entry name must not contain null bytes".into(),
            ));
        }
        if self.mime_type.len() > MAX_MIME_LEN {
            return Err(Error::ValueTooLarge(format!(
                "mime type of {} bytes exceeds {MAX_MIME_LEN}",
                self.mime_type.len()
            )));
        }
        if self.attributes.len() > MAX_ATTR_COUNT {
            return Err(Error::ValueTooLarge(format!(
                "{} attributes exceed {MAX_ATTR_COUNT}",
                self.attributes.len()
            )));
        }
        for (key, value) in &self.attributes {
            if key.is_empty() || key.len() > MAX_NAME_LEN {
                return Err(Error::InvalidFormat(format!(
                    "attribute key length {} outside [1, {MAX_NAME_LEN}]",
                    key.len()
                )));
            }
            if value.value_len() > i32::MAX as usize {
                return Err(Error::ValueTooLarge("attribute value".into()));
            }
        }
        Ok(())
    }

    // ── Serialization ───────────────────────────────────────────────────────

    fn serialize_tail(&self) -> Vec<u8> {
        let mut tail = Vec::with_capacity(self.name.len() + self.mime_type.len() + 16);
        tail.extend_from_slice(self.name.as_bytes());
        tail.extend_from_slice(self.mime_type.as_bytes());
        for (key, value) in &self.attributes {
            tail.extend_from_slice(&(key.len() as u16).to_le_bytes());
            tail.push(value.type_id());
            tail.extend_from_slice(&(value.value_len() as i32).to_le_bytes());
            tail.extend_from_slice(key.as_bytes());
            match value {
                AttrValue::String(s)  => tail.extend_from_slice(s.as_bytes()),
                AttrValue::Int64(v)   => tail.extend_from_slice(&v.to_le_bytes()),
                AttrValue::Float64(v) => tail.extend_from_slice(&v.to_le_bytes()),
                AttrValue::Bool(v)    => tail.push(u8::from(*v)),
                AttrValue::Bytes(b)   => tail.extend_from_slice(b),
            }
        }
        tail
    }

    /// Serialized header length including alignment padding.
    pub fn header_len(&self) -> u64 {
        let unpadded = ENTRY_FIXED_SIZE as u64 + self.serialize_tail().len() as u64;
        unpadded.next_multiple_of(ENTRY_ALIGN)
    }

    /// Write the full entry header (fixed prefix, tail, padding).
    /// Returns the header checksum, which doubles as the TOC
    /// `entry_checksum`.
    pub fn write_header<W: Write>(&self, w: &mut ByteWriter<W>) -> Result<u32> {
        let tail = self.serialize_tail();

        let mut fixed = [0u8; ENTRY_FIXED_SIZE];
        fixed[..4].copy_from_slice(ENTRY_MAGIC);
        fixed[4] = ENTRY_HEADER_VERSION;
        fixed[5] = if self.has_ecc { ENTRY_FLAG_ECC } else { 0 };
        // 06..08 reserved
        fixed[8..16].copy_from_slice(&(self.id as i64).to_le_bytes());
        fixed[16..24].copy_from_slice(&(self.original_size as i64).to_le_bytes());
        fixed[24..32].copy_from_slice(&(self.stored_size as i64).to_le_bytes());
        fixed[32..36].copy_from_slice(&(self.chunk_count as i32).to_le_bytes());
        fixed[36] = self.compression_id;
        fixed[37] = self.encryption_id;
        fixed[38..40].copy_from_slice(&(self.name.len() as u16).to_le_bytes());
        fixed[40..42].copy_from_slice(&(self.mime_type.len() as u16).to_le_bytes());
        fixed[42..44].copy_from_slice(&(self.attributes.len() as u16).to_le_bytes());

        let mut h = crc32fast::Hasher::new();
        h.update(&fixed[..44]);
        h.update(&tail);
        let checksum = h.finalize();
        fixed[44..48].copy_from_slice(&checksum.to_le_bytes());

        let start = w.position();
        w.write_bytes(&fixed)?;
        w.write_bytes(&tail)?;
        let written = w.position() - start;
        let padded = written.next_multiple_of(ENTRY_ALIGN);
        if padded > written {
            w.write_bytes(&[0u8; 8][..(padded - written) as usize])?;
        }
        Ok(checksum)
    }

    /// Read and validate a full entry header.
    ///
    /// The reader must be positioned at the `ENTR` magic and constructed at
    /// the entry start, so that `r.position()` afterwards equals the header
    /// length (the caller derives the first chunk offset from it).
    pub fn read_header<R: Read>(r: &mut ByteReader<R>) -> Result<Entry> {
        let mut fixed = [0u8; ENTRY_FIXED_SIZE];
        r.read_exact_buf(&mut fixed)?;

        if &fixed[..4] != ENTRY_MAGIC {
            return Err(Error::InvalidFormat("missing entry header magic".into()));
        }
        if fixed[4] != ENTRY_HEADER_VERSION {
            return Err(Error::InvalidFormat(format!(
                "unsupported entry header version {}",
                fixed[4]
            )));
        }
        let flags = fixed[5];
        let id = i64::from_le_bytes(fixed[8..16].try_into().unwrap());
        let original_size = i64::from_le_bytes(fixed[16..24].try_into().unwrap());
        let stored_size = i64::from_le_bytes(fixed[24..32].try_into().unwrap());
        let chunk_count = i32::from_le_bytes(fixed[32..36].try_into().unwrap());
        if id < 0 || original_size < 0 || stored_size < 0 || chunk_count < 0 {
            return Err(Error::InvalidFormat("negative entry header field".into()));
        }
        let compression_id = fixed[36];
        let encryption_id = fixed[37];
        let name_len = u16::from_le_bytes(fixed[38..40].try_into().unwrap()) as usize;
        let mime_len = u16::from_le_bytes(fixed[40..42].try_into().unwrap()) as usize;
        let attr_count = u16::from_le_bytes(fixed[42..44].try_into().unwrap()) as usize;
        let stored_checksum = u32::from_le_bytes(fixed[44..48].try_into().unwrap());
        if name_len == 0 {
            return Err(Error::InvalidFormat("entry name must not be empty".into()));
        }
        if mime_len > MAX_MIME_LEN {
            return Err(Error::InvalidFormat(format!(
                "mime type of {mime_len} bytes exceeds {MAX_MIME_LEN}"
            )));
        }

        let name_raw = r.read_exact_vec(name_len)?;
        let mime_raw = r.read_exact_vec(mime_len)?;
        let name = String::from_utf8(name_raw)
            .map_err(|_| Error::InvalidFormat("entry name is not valid UTF-8".into()))?;
        let mime_type = String::from_utf8(mime_raw)
            .map_err(|_| Error::InvalidFormat("mime type is not valid UTF-8".into()))?;

        let mut attributes = Vec::with_capacity(attr_count);
        for _ in 0..attr_count {
            attributes.push(read_attribute(r)?);
        }

        let entry = Entry {
            id: id as u64,
            name,
            mime_type,
            attributes,
            compression_id,
            encryption_id,
            has_ecc: flags & ENTRY_FLAG_ECC != 0,
            original_size: original_size as u64,
            stored_size: stored_size as u64,
            chunk_count: chunk_count as u32,
            entry_offset: 0,
            data_offset: 0,
        };

        // The tail re-serializes to exactly the bytes just consumed, so the
        // checksum can be recomputed without buffering the raw stream.
        let tail = entry.serialize_tail();
        let mut h = crc32fast::Hasher::new();
        h.update(&fixed[..44]);
        h.update(&tail);
        if h.finalize() != stored_checksum {
            return Err(Error::IntegrityFailure(format!(
                "entry header checksum mismatch for \"{}\"",
                entry.name
            )));
        }

        r.skip_padding(ENTRY_ALIGN)?;
        Ok(entry)
    }
}

fn read_attribute<R: Read>(r: &mut ByteReader<R>) -> Result<(String, AttrValue)> {
    let key_len = r.read_u16()? as usize;
    let type_id = r.read_u8()?;
    let value_len = r.read_i32()?;
    if key_len == 0 {
        return Err(Error::InvalidFormat("empty attribute key".into()));
    }
    if value_len < 0 {
        return Err(Error::InvalidFormat("negative attribute value length".into()));
    }
    let value_len = value_len as usize;

    let key_raw = r.read_exact_vec(key_len)?;
    let key = String::from_utf8(key_raw)
        .map_err(|_| Error::InvalidFormat("attribute key is not valid UTF-8".into()))?;

    let value = match type_id {
        0 => {
            let raw = r.read_exact_vec(value_len)?;
            AttrValue::String(String::from_utf8(raw).map_err(|_| {
                Error::InvalidFormat("string attribute is not valid UTF-8".into())
            })?)
        }
        1 => {
            expect_value_len(value_len, 8, "Int64")?;
            AttrValue::Int64(r.read_i64()?)
        }
        2 => {
            expect_value_len(value_len, 8, "Float64")?;
            AttrValue::Float64(r.read_f64()?)
        }
        3 => {
            expect_value_len(value_len, 1, "Bool")?;
            match r.read_u8()? {
                0 => AttrValue::Bool(false),
                1 => AttrValue::Bool(true),
                other => {
                    return Err(Error::InvalidFormat(format!(
                        "boolean attribute byte {other} is not 0 or 1"
                    )))
                }
            }
        }
        4 => AttrValue::Bytes(r.read_exact_vec(value_len)?),
        other => {
            return Err(Error::InvalidFormat(format!(
                "unknown attribute type {other}"
            )))
        }
    };
    Ok((key, value))
}

fn expect_value_len(got: usize, want: usize, kind: &str) -> Result<()> {
    if got != want {
        return Err(Error::InvalidFormat(format!(
            "{kind} attribute must be {want} bytes, got {got}"
        )));
    }
    Ok(())
}
