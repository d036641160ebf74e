//! Archive reader — random-access container and linear stream modes.
//!
//! # Opening (container)
//! 1. Read and validate the file header (magic, CRC, compat level).
//! 2. If encrypted, read the encryption block; key unwrap is deferred until
//!    a password arrives via options or [`ApackReader::unlock`].
//! 3. Seek to `trailer_offset`, validate the trailer checksum, then the TOC
//!    checksum over all 40-byte records.
//! 4. Verify `file_size` against the actual underlying length.
//!
//! # Opening (stream)
//! Entries are walked linearly from the current offset — entry header, then
//! chunk headers with payload seeks — building a synthetic in-memory TOC
//! until the `STRL` trailer appears.
//!
//! # Lookup
//! By name: hash the name, scan the TOC for equal hashes, load the entry
//! header and compare the full string (hash collisions are legal).  By id:
//! linear TOC scan.  Loaded entries are cached; an entry is immutable once
//! materialized.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use crate::algo;
use crate::binio::ByteReader;
use crate::checksum::name_hash;
use crate::chunk::{ChunkHeader, ChunkPipeline};
use crate::crypto::EncryptionRecord;
use crate::ecc::EccOptions;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::header::FileHeader;
use crate::trailer::{
    toc_checksum, ContainerTrailer, StreamTrailer, TocEntry, STREAM_TRAILER_MAGIC,
    TOC_ENTRY_SIZE,
};

/// Read-side configuration.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Password for encrypted archives.  May also be supplied later via
    /// [`ApackReader::unlock`].
    pub password: Option<String>,
    /// Reed–Solomon tuning for archives written with ECC.  Entries flagged
    /// for ECC decode with [`EccOptions::default`] when this is `None`.
    pub ecc: Option<EccOptions>,
}

pub struct ApackReader<R: Read + Seek> {
    source:      Option<R>,
    header:      FileHeader,
    enc_record:  Option<EncryptionRecord>,
    pipeline:    ChunkPipeline,
    toc:         Vec<TocEntry>,
    entry_cache: HashMap<u64, Entry>,
}

impl<R: Read + Seek> ApackReader<R> {
    pub fn open(source: R) -> Result<Self> {
        Self::open_with_options(source, OpenOptions::default())
    }

    pub fn open_with_options(mut source: R, options: OpenOptions) -> Result<Self> {
        source.seek(SeekFrom::Start(0))?;
        let mut br = ByteReader::new(&mut source);
        let header = FileHeader::read_from(&mut br)?;

        let enc_record = if header.is_encrypted() {
            Some(EncryptionRecord::read_from(&mut br)?)
        } else {
            None
        };
        let data_start = br.position();

        let pipeline = ChunkPipeline::new(header.checksum_algorithm()?)
            .with_ecc(options.ecc.unwrap_or_default().codec()?);

        let mut reader = Self {
            source: Some(source),
            header,
            enc_record,
            pipeline,
            toc: Vec::new(),
            entry_cache: HashMap::new(),
        };

        if reader.header.is_stream() {
            reader.scan_stream(data_start)?;
        } else {
            reader.load_toc()?;
        }

        if let Some(password) = &options.password {
            reader.unlock(password)?;
        }
        Ok(reader)
    }

    // ── Opening internals ───────────────────────────────────────────────────

    fn load_toc(&mut self) -> Result<()> {
        let source = self.source.as_mut().expect("open source");

        let trailer_offset = self.header.trailer_offset;
        if trailer_offset <= 0 {
            return Err(Error::InvalidFormat(
                "container archive has no trailer offset — file was never closed".into(),
            ));
        }
        source.seek(SeekFrom::Start(trailer_offset as u64))?;
        let trailer = ContainerTrailer::read_from(&mut *source)?;

        if trailer.entry_count < 0 || trailer.entry_count != self.header.entry_count {
            return Err(Error::InvalidFormat(format!(
                "trailer entry count {} disagrees with header {}",
                trailer.entry_count, self.header.entry_count
            )));
        }

        source.seek(SeekFrom::Start(trailer.toc_offset as u64))?;
        let mut toc = Vec::with_capacity(trailer.entry_count as usize);
        for _ in 0..trailer.entry_count {
            let mut buf = [0u8; TOC_ENTRY_SIZE];
            source.read_exact(&mut buf).map_err(Error::from_read)?;
            toc.push(TocEntry::from_bytes(&buf));
        }
        if toc_checksum(&toc) != trailer.toc_checksum {
            return Err(Error::IntegrityFailure("TOC checksum mismatch".into()));
        }

        let actual_len = source.seek(SeekFrom::End(0))?;
        if trailer.file_size as u64 != actual_len {
            return Err(Error::InvalidFormat(format!(
                "trailer records {} bytes but the archive is {} bytes",
                trailer.file_size, actual_len
            )));
        }

        self.toc = toc;
        Ok(())
    }

    /// Linear walk of a stream archive, building the synthetic TOC.
    fn scan_stream(&mut self, data_start: u64) -> Result<()> {
        let source = self.source.as_mut().expect("open source");
        source.seek(SeekFrom::Start(data_start))?;

        let mut toc = Vec::new();
        loop {
            let entry_offset = source.stream_position()?;
            let mut magic = [0u8; 4];
            source.read_exact(&mut magic).map_err(Error::from_read)?;

            if &magic == STREAM_TRAILER_MAGIC {
                StreamTrailer::read_after_magic(&mut *source)?;
                break;
            }
            // Not the trailer — must be an entry; re-read it whole.
            source.seek(SeekFrom::Start(entry_offset))?;
            let mut br = ByteReader::new(&mut *source);
            let mut entry = Entry::read_header(&mut br)?;
            entry.entry_offset = entry_offset;
            entry.data_offset = entry_offset + br.position();

            // Skip this entry's chunks to reach the next record.
            source.seek(SeekFrom::Start(entry.data_offset))?;
            for i in 0..entry.chunk_count {
                let chunk = ChunkHeader::read_from(&mut *source)?;
                if chunk.chunk_index != i {
                    return Err(Error::InvalidFormat(format!(
                        "chunk index {} where {} was expected",
                        chunk.chunk_index, i
                    )));
                }
                let should_be_last = i + 1 == entry.chunk_count;
                if chunk.is_last() != should_be_last {
                    return Err(Error::InvalidFormat(
                        "LAST chunk flag does not match the chunk count".into(),
                    ));
                }
                source.seek(SeekFrom::Current(i64::from(chunk.stored_size)))?;
            }

            toc.push(TocEntry {
                id:             entry.id,
                entry_offset,
                original_size:  entry.original_size,
                stored_size:    entry.stored_size,
                name_hash:      name_hash(&entry.name),
                entry_checksum: 0,
            });
            self.entry_cache.insert(entry.id, entry);
        }

        self.toc = toc;
        Ok(())
    }

    // ── Keys ────────────────────────────────────────────────────────────────

    /// Derive the KEK from `password` and unwrap the session DEK.  A no-op
    /// for unencrypted archives.
    pub fn unlock(&mut self, password: &str) -> Result<()> {
        let Some(record) = &self.enc_record else {
            return Ok(());
        };
        let dek = record.unwrap_dek(password)?;
        let provider = algo::require_encryption_by_id(record.cipher_id)?;
        self.pipeline.set_encryption(provider, dek);
        Ok(())
    }

    // ── Metadata ────────────────────────────────────────────────────────────

    #[inline]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// TOC records in emission order.
    #[inline]
    pub fn toc(&self) -> &[TocEntry] {
        &self.toc
    }

    #[inline]
    pub fn entry_count(&self) -> usize {
        self.toc.len()
    }

    // ── Lookup ──────────────────────────────────────────────────────────────

    fn load_entry(&mut self, toc_index: usize) -> Result<Entry> {
        let rec = self.toc[toc_index];
        if let Some(entry) = self.entry_cache.get(&rec.id) {
            return Ok(entry.clone());
        }

        let source = self.source.as_mut().ok_or(Error::AlreadyClosed)?;
        source.seek(SeekFrom::Start(rec.entry_offset))?;
        let mut br = ByteReader::new(&mut *source);
        let mut entry = Entry::read_header(&mut br)?;
        entry.entry_offset = rec.entry_offset;
        entry.data_offset = rec.entry_offset + br.position();

        self.entry_cache.insert(entry.id, entry.clone());
        Ok(entry)
    }

    /// All entries, in emission order.
    pub fn entries(&mut self) -> Result<Vec<Entry>> {
        self.check_open()?;
        (0..self.toc.len()).map(|i| self.load_entry(i)).collect()
    }

    pub fn get_by_id(&mut self, id: u64) -> Result<Option<Entry>> {
        self.check_open()?;
        for i in 0..self.toc.len() {
            if self.toc[i].id == id {
                return self.load_entry(i).map(Some);
            }
        }
        Ok(None)
    }

    /// Name lookup via the TOC hash, confirmed against the full string.
    pub fn get_by_name(&mut self, name: &str) -> Result<Option<Entry>> {
        self.check_open()?;
        let hash = name_hash(name);
        for i in 0..self.toc.len() {
            if self.toc[i].name_hash != hash {
                continue;
            }
            let entry = self.load_entry(i)?;
            if entry.name == name {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    pub fn require_by_name(&mut self, name: &str) -> Result<Entry> {
        self.get_by_name(name)?
            .ok_or_else(|| Error::EntryNotFound(name.to_owned()))
    }

    pub fn has_entry(&mut self, name: &str) -> Result<bool> {
        Ok(self.get_by_name(name)?.is_some())
    }

    // ── Reading ─────────────────────────────────────────────────────────────

    /// Decode an entire entry into memory.
    pub fn read_all(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        let mut stream = self.open_entry(entry)?;
        let mut out = Vec::with_capacity(entry.original_size as usize);
        while let Some(chunk) = stream.next_chunk()? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Open a streaming decoder over the entry's chunks.
    pub fn open_entry(&mut self, entry: &Entry) -> Result<EntryReader<'_, R>> {
        self.check_open()?;
        if entry.chunk_count == 0 {
            return Err(Error::InvalidFormat(format!(
                "entry \"{}\" declares no chunks",
                entry.name
            )));
        }
        let Self {
            source, pipeline, ..
        } = self;
        let source = source.as_mut().ok_or(Error::AlreadyClosed)?;
        source.seek(SeekFrom::Start(entry.data_offset))?;
        Ok(EntryReader {
            source,
            pipeline: &*pipeline,
            compression_id:   entry.compression_id,
            ecc:              entry.has_ecc,
            chunk_count:      entry.chunk_count,
            next_index:       0,
            buf:              Vec::new(),
            buf_pos:          0,
            done:             false,
        })
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    fn check_open(&self) -> Result<()> {
        if self.source.is_none() {
            return Err(Error::AlreadyClosed);
        }
        Ok(())
    }

    /// Direct access to the underlying source (verification walk).
    pub(crate) fn source_mut(&mut self) -> Option<&mut R> {
        self.source.as_mut()
    }

    /// Release the underlying source.  Reading afterwards fails with
    /// [`Error::AlreadyClosed`]; calling `close` again is a no-op.
    pub fn close(&mut self) {
        self.source = None;
        self.entry_cache.clear();
    }
}

// ── EntryReader ──────────────────────────────────────────────────────────────

/// Streaming decoder for one entry.  Yields plaintext chunk by chunk;
/// implements [`Read`] on top of the same cursor.
pub struct EntryReader<'a, R: Read + Seek> {
    source:         &'a mut R,
    pipeline:       &'a ChunkPipeline,
    compression_id: u8,
    ecc:            bool,
    chunk_count:    u32,
    next_index:     u32,
    buf:            Vec<u8>,
    buf_pos:        usize,
    done:           bool,
}

impl<R: Read + Seek> EntryReader<'_, R> {
    /// Decode the next chunk, or `None` after the `LAST` chunk.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }

        let header = ChunkHeader::read_from(&mut *self.source)?;
        if header.chunk_index != self.next_index {
            return Err(Error::InvalidFormat(format!(
                "chunk index {} where {} was expected",
                header.chunk_index, self.next_index
            )));
        }
        let should_be_last = self.next_index + 1 == self.chunk_count;
        if header.is_last() != should_be_last {
            return Err(Error::InvalidFormat(
                "LAST chunk flag does not match the chunk count".into(),
            ));
        }

        let mut stored = vec![0u8; header.stored_size as usize];
        self.source.read_exact(&mut stored).map_err(Error::from_read)?;
        let plaintext = self
            .pipeline
            .decode(&header, &stored, self.compression_id, self.ecc)?;

        self.next_index += 1;
        if header.is_last() {
            self.done = true;
        }
        Ok(Some(plaintext))
    }
}

impl<R: Read + Seek> Read for EntryReader<'_, R> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        while self.buf_pos >= self.buf.len() {
            match self.next_chunk() {
                Ok(Some(chunk)) => {
                    self.buf = chunk;
                    self.buf_pos = 0;
                }
                Ok(None) => return Ok(0),
                Err(e) => return Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
            }
        }
        let n = out.len().min(self.buf.len() - self.buf_pos);
        out[..n].copy_from_slice(&self.buf[self.buf_pos..self.buf_pos + n]);
        self.buf_pos += n;
        Ok(n)
    }
}
