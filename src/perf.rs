//! Performance utilities: write-buffer batching and parallel chunk
//! compression.
//!
//! # Write buffer
//! [`WriteBuffer`] accumulates small writes into a fixed-capacity buffer
//! and flushes to the underlying writer in large runs, cutting the number
//! of `write` syscalls on small-entry workloads.
//!
//! # Parallel compression
//! [`compress_chunks_parallel`] (feature `parallel`) compresses independent
//! chunks concurrently with Rayon.  Only the compression stage runs in
//! parallel; checksumming, encryption, ECC, and writing stay sequential on
//! the session thread, preserving the single-threaded session contract.

use std::io::{self, Write};

#[cfg(feature = "parallel")]
use std::sync::Arc;

#[cfg(feature = "parallel")]
use crate::algo::CompressionProvider;
#[cfg(feature = "parallel")]
use crate::error::Result;

/// Default batching capacity: 1 MiB.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024 * 1024;

// ── Write buffer ─────────────────────────────────────────────────────────────

pub struct WriteBuffer<W: Write> {
    inner: W,
    buf:   Vec<u8>,
    cap:   usize,
}

impl<W: Write> WriteBuffer<W> {
    pub fn new(inner: W) -> Self {
        Self::with_capacity(inner, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(inner: W, cap: usize) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(cap.max(1)),
            cap: cap.max(1),
        }
    }

    /// Flush the buffer and return the inner writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush_buf()?;
        Ok(self.inner)
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl<W: Write + io::Seek> io::Seek for WriteBuffer<W> {
    /// Seeking flushes pending bytes first so the underlying position is
    /// exact.  This keeps the buffer usable under the archive writer,
    /// which seeks back to patch headers.
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.flush_buf()?;
        self.inner.seek(pos)
    }
}

impl<W: Write> Write for WriteBuffer<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        // Oversized writes bypass the buffer entirely.
        if data.len() >= self.cap {
            self.flush_buf()?;
            self.inner.write_all(data)?;
            return Ok(data.len());
        }
        if self.buf.len() + data.len() > self.cap {
            self.flush_buf()?;
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buf()?;
        self.inner.flush()
    }
}

// ── Parallel chunk compression ───────────────────────────────────────────────

/// A compressed chunk produced by [`compress_chunks_parallel`].
#[cfg(feature = "parallel")]
#[derive(Debug)]
pub struct CompressedChunk {
    pub chunk_index:   usize,
    pub original_size: usize,
    /// Compressed bytes, or a copy of the input when compression did not
    /// shrink it.
    pub payload:       Vec<u8>,
    /// Whether `payload` is actually compressed.
    pub compressed:    bool,
}

/// Compress `chunks` concurrently.  Results come back in input order; the
/// first error aborts the remaining work.
#[cfg(feature = "parallel")]
pub fn compress_chunks_parallel(
    chunks: &[&[u8]],
    provider: &Arc<dyn CompressionProvider>,
    level: i32,
) -> Result<Vec<CompressedChunk>> {
    use rayon::prelude::*;

    chunks
        .par_iter()
        .enumerate()
        .map(|(chunk_index, data)| {
            let compressed = provider.compress(data, level)?;
            let keep = compressed.len() < data.len();
            Ok(CompressedChunk {
                chunk_index,
                original_size: data.len(),
                payload: if keep { compressed } else { data.to_vec() },
                compressed: keep,
            })
        })
        .collect()
}
