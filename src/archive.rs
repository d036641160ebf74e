//! High-level [`Archive`] API — the primary embedding surface.
//!
//! ```no_run
//! use apack::archive::Archive;
//! use apack::writer::ArchiveOptions;
//!
//! // Write
//! let mut ar = Archive::create("out.apack", ArchiveOptions::default())?;
//! ar.add_bytes("readme.txt", b"Hello, world!")?;
//! ar.close()?;
//!
//! // Read
//! let mut ar = Archive::open("out.apack")?;
//! let data = ar.read_all("readme.txt")?;
//! assert_eq!(data, b"Hello, world!");
//! # Ok::<(), apack::Error>(())
//! ```

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::reader::{ApackReader, OpenOptions};
use crate::writer::{ApackWriter, ArchiveOptions};

/// Open a writer over any seekable sink.
pub fn create_archive<W: Write + Seek>(sink: W, options: &ArchiveOptions) -> Result<ApackWriter<W>> {
    ApackWriter::create(sink, options)
}

/// Open a reader over any seekable source.
pub fn open_archive<R: Read + Seek>(source: R, password: Option<&str>) -> Result<ApackReader<R>> {
    ApackReader::open_with_options(
        source,
        OpenOptions {
            password: password.map(str::to_owned),
            ecc:      None,
        },
    )
}

enum Mode {
    Read(ApackReader<File>),
    Write(ApackWriter<File>),
}

/// Path-based archive handle wrapping [`ApackWriter`] / [`ApackReader`].
pub struct Archive {
    path: PathBuf,
    mode: Mode,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field(
                "mode",
                match &self.mode {
                    Mode::Read(_) => &"Read",
                    Mode::Write(_) => &"Write",
                },
            )
            .finish()
    }
}

impl Archive {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn create<P: AsRef<Path>>(path: P, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let writer = ApackWriter::create(File::create(&path)?, &options)?;
        Ok(Self {
            path,
            mode: Mode::Write(writer),
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, OpenOptions::default())
    }

    pub fn open_encrypted<P: AsRef<Path>>(path: P, password: &str) -> Result<Self> {
        Self::open_with_options(
            path,
            OpenOptions {
                password: Some(password.to_owned()),
                ecc:      None,
            },
        )
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_owned();
        let reader = ApackReader::open_with_options(File::open(&path)?, options)?;
        Ok(Self {
            path,
            mode: Mode::Read(reader),
        })
    }

    // ── Write ────────────────────────────────────────────────────────────────

    /// Add a whole in-memory buffer as one entry.  Returns the assigned id.
    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<u64> {
        self.add_entry(Entry::new(name), data)
    }

    pub fn add_entry(&mut self, meta: Entry, data: &[u8]) -> Result<u64> {
        match &mut self.mode {
            Mode::Write(w) => {
                let mut stream = w.add_entry(meta)?;
                stream.write_bytes(data)?;
                let entry = stream.finish()?;
                Ok(entry.id)
            }
            Mode::Read(_) => Err(read_only()),
        }
    }

    /// Finalize the trailer and release the file handle.  Must be called
    /// once on a written archive; idempotent afterwards.
    pub fn close(&mut self) -> Result<()> {
        match &mut self.mode {
            Mode::Write(w) => w.close(),
            Mode::Read(r) => {
                r.close();
                Ok(())
            }
        }
    }

    // ── Read ─────────────────────────────────────────────────────────────────

    pub fn unlock(&mut self, password: &str) -> Result<()> {
        match &mut self.mode {
            Mode::Read(r) => r.unlock(password),
            Mode::Write(_) => Err(write_only()),
        }
    }

    pub fn entries(&mut self) -> Result<Vec<Entry>> {
        match &mut self.mode {
            Mode::Read(r) => r.entries(),
            Mode::Write(_) => Err(write_only()),
        }
    }

    pub fn has_entry(&mut self, name: &str) -> Result<bool> {
        match &mut self.mode {
            Mode::Read(r) => r.has_entry(name),
            Mode::Write(_) => Err(write_only()),
        }
    }

    pub fn read_all(&mut self, name: &str) -> Result<Vec<u8>> {
        match &mut self.mode {
            Mode::Read(r) => {
                let entry = r.require_by_name(name)?;
                r.read_all(&entry)
            }
            Mode::Write(_) => Err(write_only()),
        }
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrow the underlying reader for lower-level operations.
    pub fn reader(&mut self) -> Result<&mut ApackReader<File>> {
        match &mut self.mode {
            Mode::Read(r) => Ok(r),
            Mode::Write(_) => Err(write_only()),
        }
    }
}

fn read_only() -> Error {
    Error::InvalidFormat("archive is open for reading".into())
}

fn write_only() -> Error {
    Error::InvalidFormat("archive is open for writing".into())
}
