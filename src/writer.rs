//! Archive writer — produces container or stream archives.
//!
//! # State machine
//! `Open → (AddingEntry → StreamingChunks)* → Closing → Closed`.
//! [`ApackWriter::create`] writes the file header with provisional zeros
//! for `trailer_offset` and `entry_count` plus the optional encryption
//! block, and stays in `Open`.  [`ApackWriter::add_entry`] hands out an
//! [`EntryStream`] that accumulates bytes into chunk-sized buffers and
//! emits one chunk per full buffer; closing the stream emits the final
//! (possibly empty) chunk with `LAST` set, patches the entry header in
//! place with the final sizes, and appends a TOC record in memory.
//! [`ApackWriter::close`] writes the trailer, patches the file header, and
//! flushes; it must be called, and is idempotent after the first call.
//!
//! # Poisoning
//! Any I/O failure poisons the writer: every subsequent operation except
//! `close` fails fast with [`Error::Poisoned`], and `close` on a poisoned
//! writer releases the handle without attempting to finalize the trailer.
//! An archive left behind by a drop-without-close is invalid and must be
//! re-created.

use std::collections::HashSet;
use std::io::{Seek, SeekFrom, Write};
use std::mem;

use crate::algo::{self, KdfParams, DEFAULT_COMPRESSION_LEVEL};
use crate::binio::ByteWriter;
use crate::checksum::{name_hash, ChecksumAlgorithm};
use crate::chunk::ChunkPipeline;
use crate::crypto::EncryptionRecord;
use crate::ecc::EccOptions;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::header::{
    validate_chunk_size, FileHeader, DEFAULT_CHUNK_SIZE, MODE_COMPRESSED, MODE_ENCRYPTED,
    MODE_RANDOM_ACCESS, MODE_STREAM,
};
use crate::trailer::{
    toc_checksum, ContainerTrailer, StreamTrailer, TocEntry, CONTAINER_TRAILER_SIZE,
    TOC_ENTRY_SIZE, TRAILER_VERSION,
};

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    /// Random-access layout with a trailer-resident TOC.
    Container,
    /// Linear layout finished by a 32-byte summary trailer, no TOC.
    Stream,
}

#[derive(Debug, Clone)]
pub struct CompressionOptions {
    /// Numeric id of a registered compression provider.
    pub algorithm: u8,
    pub level:     i32,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            algorithm: algo::COMPRESSION_ZSTD,
            level:     DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncryptionOptions {
    pub password: String,
    /// Numeric id of a registered AEAD provider.
    pub cipher:   u8,
    /// Numeric id of a registered KDF provider.
    pub kdf:      u8,
    pub params:   KdfParams,
}

impl EncryptionOptions {
    /// AES-256-GCM under an Argon2id-derived KEK.
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            cipher:   algo::ENCRYPTION_AES256_GCM,
            kdf:      algo::KDF_ARGON2ID,
            params:   KdfParams::argon2id_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub mode:        ArchiveMode,
    pub chunk_size:  u32,
    pub checksum:    ChecksumAlgorithm,
    pub compression: Option<CompressionOptions>,
    pub encryption:  Option<EncryptionOptions>,
    pub ecc:         Option<EccOptions>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            mode:        ArchiveMode::Container,
            chunk_size:  DEFAULT_CHUNK_SIZE,
            checksum:    ChecksumAlgorithm::Crc32,
            compression: None,
            encryption:  None,
            ecc:         None,
        }
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Closed,
    Poisoned,
}

pub struct ApackWriter<W: Write + Seek> {
    sink:           W,
    header:         FileHeader,
    pipeline:       ChunkPipeline,
    mode:           ArchiveMode,
    chunk_size:     usize,
    compression_id: u8,
    encryption_id:  u8,
    toc:            Vec<TocEntry>,
    used_ids:       HashSet<u64>,
    next_id:        u64,
    total_original: u64,
    total_stored:   u64,
    total_chunks:   u64,
    state:          WriterState,
}

impl<W: Write + Seek> ApackWriter<W> {
    /// Write the provisional file header (and encryption block, when
    /// configured) and return a writer in the `Open` state.
    pub fn create(mut sink: W, options: &ArchiveOptions) -> Result<Self> {
        validate_chunk_size(options.chunk_size)?;

        let mut mode_flags = match options.mode {
            ArchiveMode::Container => MODE_RANDOM_ACCESS,
            ArchiveMode::Stream    => MODE_STREAM,
        };

        let mut pipeline = ChunkPipeline::new(options.checksum);
        let mut compression_id = algo::COMPRESSION_NONE;
        if let Some(c) = &options.compression {
            let provider = algo::require_compression_by_id(c.algorithm)?;
            compression_id = c.algorithm;
            mode_flags |= MODE_COMPRESSED;
            pipeline = pipeline.with_compression(provider, c.level);
        }

        let mut encryption_id = algo::ENCRYPTION_NONE;
        let mut record = None;
        if let Some(e) = &options.encryption {
            let provider = algo::require_encryption_by_id(e.cipher)?;
            let (rec, dek) = EncryptionRecord::create(&e.password, e.kdf, e.cipher, e.params)?;
            encryption_id = e.cipher;
            mode_flags |= MODE_ENCRYPTED;
            pipeline = pipeline.with_encryption(provider, dek);
            record = Some(rec);
        }

        if let Some(ecc) = options.ecc {
            pipeline = pipeline.with_ecc(ecc.codec()?);
        }

        let header = FileHeader::new(mode_flags, options.checksum, options.chunk_size);
        sink.seek(SeekFrom::Start(0))?;
        sink.write_all(&header.to_bytes())?;
        if let Some(rec) = &record {
            let mut bw = ByteWriter::new(&mut sink);
            rec.write_to(&mut bw)?;
        }

        Ok(Self {
            sink,
            header,
            pipeline,
            mode: options.mode,
            chunk_size: options.chunk_size as usize,
            compression_id,
            encryption_id,
            toc: Vec::new(),
            used_ids: HashSet::new(),
            next_id: 1,
            total_original: 0,
            total_stored: 0,
            total_chunks: 0,
            state: WriterState::Open,
        })
    }

    #[inline]
    pub fn mode(&self) -> ArchiveMode {
        self.mode
    }

    /// TOC accumulated so far (completed entries only, in emission order).
    #[inline]
    pub fn toc(&self) -> &[TocEntry] {
        &self.toc
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            WriterState::Open     => Ok(()),
            WriterState::Closed   => Err(Error::AlreadyClosed),
            WriterState::Poisoned => Err(Error::Poisoned),
        }
    }

    /// Begin streaming a new entry.
    ///
    /// `meta.id == 0` auto-assigns the next sequential id (starting at 1);
    /// a non-zero id must be unused.  The writer stamps the archive's
    /// compression/encryption/ECC configuration onto the entry.
    pub fn add_entry(&mut self, mut meta: Entry) -> Result<EntryStream<'_, W>> {
        self.check_open()?;
        meta.validate()?;

        if meta.id == 0 {
            meta.id = self.next_id;
        } else if self.used_ids.contains(&meta.id) {
            return Err(Error::InvalidFormat(format!(
                "duplicate entry id {}",
                meta.id
            )));
        }
        self.next_id = self.next_id.max(meta.id + 1);
        self.used_ids.insert(meta.id);

        meta.compression_id = self.compression_id;
        meta.encryption_id = self.encryption_id;
        meta.has_ecc = self.pipeline.has_ecc();
        meta.original_size = 0;
        meta.stored_size = 0;
        meta.chunk_count = 0;

        let result: Result<()> = (|| {
            meta.entry_offset = self.sink.stream_position()?;
            let mut bw = ByteWriter::new(&mut self.sink);
            meta.write_header(&mut bw)?;
            meta.data_offset = meta.entry_offset + bw.position();
            Ok(())
        })();
        if let Err(e) = result {
            self.poison_on_io(&e);
            return Err(e);
        }

        let chunk_size = self.chunk_size;
        Ok(EntryStream {
            writer: self,
            entry: meta,
            buf: Vec::with_capacity(chunk_size),
            chunk_index: 0,
            finished: false,
        })
    }

    /// Write the trailer, patch the file header, flush, and close.
    ///
    /// Idempotent after the first call.  On a poisoned writer the trailer
    /// is not finalized; the handle is still released.
    pub fn close(&mut self) -> Result<()> {
        match self.state {
            WriterState::Closed => return Ok(()),
            WriterState::Poisoned => {
                self.state = WriterState::Closed;
                let _ = self.sink.flush();
                return Ok(());
            }
            WriterState::Open => {}
        }

        let result = self.finalize();
        match result {
            Ok(()) => {
                self.state = WriterState::Closed;
                Ok(())
            }
            Err(e) => {
                self.state = WriterState::Poisoned;
                Err(e)
            }
        }
    }

    fn finalize(&mut self) -> Result<()> {
        let trailer_offset = self.sink.stream_position()? as i64;

        match self.mode {
            ArchiveMode::Container => {
                let toc_size = (self.toc.len() * TOC_ENTRY_SIZE) as i64;
                let trailer = ContainerTrailer {
                    trailer_version:     TRAILER_VERSION,
                    toc_offset:          trailer_offset + CONTAINER_TRAILER_SIZE as i64,
                    toc_size,
                    entry_count:         self.toc.len() as i64,
                    total_original_size: self.total_original as i64,
                    total_stored_size:   self.total_stored as i64,
                    toc_checksum:        toc_checksum(&self.toc),
                    file_size:           trailer_offset + CONTAINER_TRAILER_SIZE as i64 + toc_size,
                };
                trailer.write_to(&mut self.sink, &self.toc)?;
            }
            ArchiveMode::Stream => {
                let trailer = StreamTrailer {
                    original_size: self.total_original as i64,
                    stored_size:   self.total_stored as i64,
                    chunk_count:   self.total_chunks as i32,
                };
                trailer.write_to(&mut self.sink)?;
            }
        }

        self.header.entry_count = self.toc.len() as i64;
        self.header.trailer_offset = trailer_offset;
        self.sink.seek(SeekFrom::Start(0))?;
        self.sink.write_all(&self.header.to_bytes())?;
        self.sink.flush()?;
        Ok(())
    }

    fn poison_on_io(&mut self, e: &Error) {
        if matches!(e, Error::Io(_) | Error::UnexpectedEof) {
            self.state = WriterState::Poisoned;
        }
    }
}

// ── EntryStream ──────────────────────────────────────────────────────────────

/// Byte sink for one entry.  Accumulates `chunk_size` bytes per chunk; the
/// final chunk (flushed by [`finish`](EntryStream::finish) or on drop)
/// carries the `LAST` flag and may be empty.
pub struct EntryStream<'a, W: Write + Seek> {
    writer:      &'a mut ApackWriter<W>,
    entry:       Entry,
    buf:         Vec<u8>,
    chunk_index: u32,
    finished:    bool,
}

impl<'a, W: Write + Seek> EntryStream<'a, W> {
    /// Append bytes to the entry.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.check_open()?;
        self.buf.extend_from_slice(data);
        while self.buf.len() >= self.writer.chunk_size {
            let rest = self.buf.split_off(self.writer.chunk_size);
            let full = mem::replace(&mut self.buf, rest);
            if let Err(e) = self.emit_chunk(&full, false) {
                self.writer.poison_on_io(&e);
                return Err(e);
            }
        }
        Ok(())
    }

    fn emit_chunk(&mut self, data: &[u8], last: bool) -> Result<()> {
        let (header, payload) = self.writer.pipeline.encode(self.chunk_index, data, last)?;
        header.write_to(&mut self.writer.sink)?;
        self.writer.sink.write_all(&payload)?;
        self.entry.original_size += data.len() as u64;
        self.entry.stored_size += payload.len() as u64;
        self.chunk_index += 1;
        Ok(())
    }

    /// Flush the final `LAST` chunk, patch the entry header with the final
    /// sizes, append the TOC record, and return the completed entry.
    pub fn finish(mut self) -> Result<Entry> {
        self.finish_inner()?;
        Ok(self.entry.clone())
    }

    fn finish_inner(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.writer.check_open()?;
        self.finished = true;

        let result: Result<u32> = (|| {
            let data = mem::take(&mut self.buf);
            self.emit_chunk(&data, true)?;
            self.entry.chunk_count = self.chunk_index;

            // Patch the provisional entry header in place; the tail is
            // unchanged, so the length is identical.
            let end = self.writer.sink.stream_position()?;
            self.writer
                .sink
                .seek(SeekFrom::Start(self.entry.entry_offset))?;
            let mut bw = ByteWriter::new(&mut self.writer.sink);
            let checksum = self.entry.write_header(&mut bw)?;
            self.writer.sink.seek(SeekFrom::Start(end))?;
            Ok(checksum)
        })();

        let checksum = match result {
            Ok(c) => c,
            Err(e) => {
                self.writer.poison_on_io(&e);
                return Err(e);
            }
        };

        self.writer.toc.push(TocEntry {
            id:             self.entry.id,
            entry_offset:   self.entry.entry_offset,
            original_size:  self.entry.original_size,
            stored_size:    self.entry.stored_size,
            name_hash:      name_hash(&self.entry.name),
            entry_checksum: checksum,
        });
        self.writer.total_original += self.entry.original_size;
        self.writer.total_stored += self.entry.stored_size;
        self.writer.total_chunks += u64::from(self.entry.chunk_count);
        Ok(())
    }
}

impl<W: Write + Seek> Write for EntryStream<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // Chunks flush on their own boundaries; nothing to force here.
        Ok(())
    }
}

impl<W: Write + Seek> Drop for EntryStream<'_, W> {
    fn drop(&mut self) {
        // Implicit LAST-chunk flush attempt; a failure here poisons the
        // writer via finish_inner's own error path.
        let _ = self.finish_inner();
    }
}
