//! Little-endian primitive codec with running byte counters.
//!
//! Every multi-byte integer in the APACK format is little-endian; strings
//! are raw UTF-8 runs or 16-bit length-prefixed.  [`ByteWriter`] and
//! [`ByteReader`] wrap any `Write`/`Read` and count the bytes that pass
//! through them, which is what the writer and reader use for alignment
//! padding and offset bookkeeping.
//!
//! The counters start at zero when the wrapper is constructed, so alignment
//! is always relative to the wrapped stream position — entry headers pad to
//! an 8-byte boundary *relative to their own start*, not the file start.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{Error, Result};

/// Bytes 0–5 of every archive: the 5 ASCII magic bytes plus a null.
pub const FILE_MAGIC: &[u8; 6] = b"APACK\0";

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ByteWriter<W: Write> {
    inner:   W,
    written: u64,
}

impl<W: Write> ByteWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Bytes written through this wrapper since construction.
    #[inline]
    pub fn position(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.inner.write_u8(v)?;
        self.written += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.inner.write_u16::<LittleEndian>(v)?;
        self.written += 2;
        Ok(())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.inner.write_i32::<LittleEndian>(v)?;
        self.written += 4;
        Ok(())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.inner.write_u32::<LittleEndian>(v)?;
        self.written += 4;
        Ok(())
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.inner.write_i64::<LittleEndian>(v)?;
        self.written += 8;
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.inner.write_u64::<LittleEndian>(v)?;
        self.written += 8;
        Ok(())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.inner.write_f64::<LittleEndian>(v)?;
        self.written += 8;
        Ok(())
    }

    pub fn write_bytes(&mut self, b: &[u8]) -> Result<()> {
        self.inner.write_all(b)?;
        self.written += b.len() as u64;
        Ok(())
    }

    /// Write a 16-bit length prefix followed by the UTF-8 bytes.
    ///
    /// Fails with [`Error::ValueTooLarge`] instead of truncating when the
    /// string exceeds `u16::MAX` bytes.
    pub fn write_str16(&mut self, s: &str) -> Result<()> {
        let len = s.len();
        if len > u16::MAX as usize {
            return Err(Error::ValueTooLarge(format!(
                "string of {len} bytes exceeds the 16-bit length prefix"
            )));
        }
        self.write_u16(len as u16)?;
        self.write_bytes(s.as_bytes())
    }

    /// Write zero bytes until the running counter is a multiple of `align`.
    pub fn pad_to(&mut self, align: u64) -> Result<()> {
        debug_assert!(align.is_power_of_two());
        let rem = self.written % align;
        if rem != 0 {
            let pad = (align - rem) as usize;
            self.write_bytes(&[0u8; 8][..pad.min(8)])?;
            if pad > 8 {
                self.write_bytes(&vec![0u8; pad - 8])?;
            }
        }
        Ok(())
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ByteReader<R: Read> {
    inner:    R,
    consumed: u64,
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, consumed: 0 }
    }

    /// Bytes consumed through this wrapper since construction.
    #[inline]
    pub fn position(&self) -> u64 {
        self.consumed
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let v = self.inner.read_u8().map_err(Error::from_read)?;
        self.consumed += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let v = self.inner.read_u16::<LittleEndian>().map_err(Error::from_read)?;
        self.consumed += 2;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let v = self.inner.read_i32::<LittleEndian>().map_err(Error::from_read)?;
        self.consumed += 4;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let v = self.inner.read_u32::<LittleEndian>().map_err(Error::from_read)?;
        self.consumed += 4;
        Ok(v)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let v = self.inner.read_i64::<LittleEndian>().map_err(Error::from_read)?;
        self.consumed += 8;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let v = self.inner.read_u64::<LittleEndian>().map_err(Error::from_read)?;
        self.consumed += 8;
        Ok(v)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let v = self.inner.read_f64::<LittleEndian>().map_err(Error::from_read)?;
        self.consumed += 8;
        Ok(v)
    }

    pub fn read_exact_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).map_err(Error::from_read)?;
        self.consumed += len as u64;
        Ok(buf)
    }

    pub fn read_exact_buf(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(Error::from_read)?;
        self.consumed += buf.len() as u64;
        Ok(())
    }

    /// Read a 16-bit length prefix followed by that many UTF-8 bytes.
    pub fn read_str16(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let raw = self.read_exact_vec(len)?;
        String::from_utf8(raw)
            .map_err(|_| Error::InvalidFormat("length-prefixed string is not valid UTF-8".into()))
    }

    /// Validate the 6-byte archive magic (`APACK` plus a null byte).
    pub fn read_file_magic(&mut self) -> Result<()> {
        let mut buf = [0u8; 6];
        self.read_exact_buf(&mut buf)?;
        if &buf != FILE_MAGIC {
            return Err(Error::InvalidFormat("not an APACK archive".into()));
        }
        Ok(())
    }

    /// Validate an exact magic run (`ENTR`, `CHNK`, …).
    pub fn expect_magic(&mut self, magic: &[u8], what: &str) -> Result<()> {
        let got = self.read_exact_vec(magic.len())?;
        if got != magic {
            return Err(Error::InvalidFormat(format!("missing {what} magic")));
        }
        Ok(())
    }

    /// Consume bytes until the running counter is a multiple of `align`.
    ///
    /// Fails with [`Error::UnexpectedEof`] when the stream ends inside the
    /// padding run.
    pub fn skip_padding(&mut self, align: u64) -> Result<()> {
        debug_assert!(align.is_power_of_two());
        let rem = self.consumed % align;
        if rem != 0 {
            let pad = (align - rem) as usize;
            let mut buf = [0u8; 8];
            self.read_exact_buf(&mut buf[..pad.min(8)])?;
            if pad > 8 {
                self.read_exact_vec(pad - 8)?;
            }
        }
        Ok(())
    }
}
