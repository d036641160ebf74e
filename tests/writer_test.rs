use std::io::{self, Cursor, Seek, SeekFrom, Write};
use std::sync::Arc;

use apack::algo::{self, CompressionProvider};
use apack::archive::Archive;
use apack::entry::Entry;
use apack::error::Error;
use apack::perf::WriteBuffer;
use apack::verify::{verify_archive, ArchiveQuality, EntryHealth};
use apack::writer::{ArchiveOptions, CompressionOptions};
use apack::{create_archive, open_archive};
use tempfile::NamedTempFile;

// ── Poisoning ────────────────────────────────────────────────────────────────

/// In-memory sink that starts failing after a byte budget is spent.
struct FailingSink {
    inner:  Cursor<Vec<u8>>,
    budget: usize,
}

impl FailingSink {
    fn new(budget: usize) -> Self {
        Self {
            inner: Cursor::new(Vec::new()),
            budget,
        }
    }
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() > self.budget {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.budget -= buf.len();
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for FailingSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[test]
fn io_failure_poisons_the_writer() {
    // Enough budget for the header and entry header, not for the chunk.
    let sink = FailingSink::new(200);
    let mut writer = create_archive(sink, &ArchiveOptions::default()).unwrap();

    let err = {
        let mut stream = writer.add_entry(Entry::new("doomed")).unwrap();
        let big = vec![0u8; 512 * 1024]; // two chunks' worth
        stream.write_bytes(&big).unwrap_err()
    };
    assert!(matches!(err, Error::Io(_)));

    // Everything except close now fails fast.
    assert!(matches!(
        writer.add_entry(Entry::new("after")),
        Err(Error::Poisoned)
    ));

    // close releases without finalizing and reports success.
    writer.close().unwrap();
}

// ── Close semantics ──────────────────────────────────────────────────────────

#[test]
fn close_is_idempotent_and_required() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();

    let mut ar = Archive::create(&path, ArchiveOptions::default()).unwrap();
    ar.add_bytes("a", b"abc").unwrap();
    ar.close().unwrap();
    ar.close().unwrap(); // second close is a no-op

    // A dropped-without-close archive is invalid.
    let tmp2 = NamedTempFile::new().unwrap();
    let path2 = tmp2.path().to_path_buf();
    {
        let mut ar = Archive::create(&path2, ArchiveOptions::default()).unwrap();
        ar.add_bytes("a", b"abc").unwrap();
        // no close
    }
    assert!(Archive::open(&path2).is_err());
}

#[test]
fn reader_close_makes_operations_fail() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    {
        let mut ar = Archive::create(&path, ArchiveOptions::default()).unwrap();
        ar.add_bytes("a", b"abc").unwrap();
        ar.close().unwrap();
    }

    let file = std::fs::File::open(&path).unwrap();
    let mut reader = open_archive(file, None).unwrap();
    let entry = reader.require_by_name("a").unwrap();
    reader.close();
    assert!(matches!(reader.read_all(&entry), Err(Error::AlreadyClosed)));
    assert!(matches!(reader.entries(), Err(Error::AlreadyClosed)));
    reader.close(); // idempotent
}

// ── Entry ids ────────────────────────────────────────────────────────────────

#[test]
fn ids_are_assigned_sequentially_and_duplicates_rejected() {
    let sink = Cursor::new(Vec::new());
    let mut writer = create_archive(sink, &ArchiveOptions::default()).unwrap();

    let a = writer.add_entry(Entry::new("a")).unwrap().finish().unwrap();
    assert_eq!(a.id, 1);

    let mut explicit = Entry::new("b");
    explicit.id = 7;
    let b = writer.add_entry(explicit).unwrap().finish().unwrap();
    assert_eq!(b.id, 7);

    // Auto-assignment continues past the explicit id.
    let c = writer.add_entry(Entry::new("c")).unwrap().finish().unwrap();
    assert_eq!(c.id, 8);

    let mut dup = Entry::new("d");
    dup.id = 7;
    assert!(matches!(writer.add_entry(dup), Err(Error::InvalidFormat(_))));
    writer.close().unwrap();
}

#[test]
fn dropping_an_entry_stream_flushes_the_last_chunk() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    {
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = create_archive(file, &ArchiveOptions::default()).unwrap();
        {
            let mut stream = writer.add_entry(Entry::new("dropped")).unwrap();
            stream.write_bytes(b"flushed by drop").unwrap();
            // stream dropped here without finish()
        }
        writer.close().unwrap();
    }

    let mut ar = Archive::open(&path).unwrap();
    assert_eq!(ar.read_all("dropped").unwrap(), b"flushed by drop");
}

// ── Verification walk ────────────────────────────────────────────────────────

#[test]
fn verify_reports_intact_and_damaged_entries() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    {
        let mut ar = Archive::create(&path, ArchiveOptions::default()).unwrap();
        ar.add_bytes("good", b"good data").unwrap();
        ar.add_bytes("bad", b"doomed data").unwrap();
        ar.close().unwrap();
    }

    // Intact archive first.
    {
        let file = std::fs::File::open(&path).unwrap();
        let mut reader = open_archive(file, None).unwrap();
        let report = verify_archive(&mut reader, true).unwrap();
        assert_eq!(report.quality, ArchiveQuality::Intact);
        assert_eq!(report.intact_entries, 2);
        // The report serializes for external tooling.
        assert!(report.to_json().unwrap().contains("\"good\""));
    }

    // Flip a payload byte of "bad".
    let mut bytes = std::fs::read(&path).unwrap();
    let at = bytes
        .windows(11)
        .position(|w| w == b"doomed data")
        .unwrap();
    bytes[at + 3] ^= 0x10;
    std::fs::write(&path, &bytes).unwrap();

    let file = std::fs::File::open(&path).unwrap();
    let mut reader = open_archive(file, None).unwrap();

    // Structural walk does not decode payloads, so it still passes.
    let shallow = verify_archive(&mut reader, false).unwrap();
    assert_eq!(shallow.quality, ArchiveQuality::Intact);

    // Deep walk decodes and catches the checksum mismatch.
    let deep = verify_archive(&mut reader, true).unwrap();
    assert_eq!(deep.quality, ArchiveQuality::Degraded);
    assert_eq!(deep.intact_entries, 1);
    let bad = deep.entries.iter().find(|e| e.name == "bad").unwrap();
    assert!(matches!(bad.health, EntryHealth::ChunkCorrupt { .. }));
}

// ── Write batching ───────────────────────────────────────────────────────────

#[test]
fn write_buffer_batches_small_writes() {
    let mut buffer = WriteBuffer::with_capacity(Vec::new(), 64);
    for _ in 0..10 {
        buffer.write_all(b"0123456789").unwrap();
    }
    let inner = buffer.into_inner().unwrap();
    assert_eq!(inner.len(), 100);
    assert_eq!(&inner[..10], b"0123456789");
}

#[test]
fn archive_composes_with_write_buffer() {
    let buffered = WriteBuffer::new(Cursor::new(Vec::new()));
    let mut writer = create_archive(buffered, &ArchiveOptions::default()).unwrap();
    writer
        .add_entry(Entry::new("buffered"))
        .unwrap()
        .finish()
        .unwrap();
    writer.close().unwrap();
}

// ── Registry semantics ───────────────────────────────────────────────────────

struct FakeZstd;

impl CompressionProvider for FakeZstd {
    fn numeric_id(&self) -> u8 {
        algo::COMPRESSION_ZSTD
    }
    fn name(&self) -> &'static str {
        "zstd"
    }
    fn compress(&self, _data: &[u8], _level: i32) -> apack::Result<Vec<u8>> {
        panic!("impostor provider must never win registration")
    }
    fn decompress(&self, _data: &[u8]) -> apack::Result<Vec<u8>> {
        panic!("impostor provider must never win registration")
    }
}

#[test]
fn registry_first_registration_wins() {
    // Built-ins are seeded before this call, so the impostor is ignored.
    let _ = algo::get_compression("zstd");
    algo::register_compression(Arc::new(FakeZstd));

    let provider = algo::require_compression_by_id(algo::COMPRESSION_ZSTD).unwrap();
    let out = provider.compress(b"still the real zstd", 3).unwrap();
    assert!(provider.decompress(&out).unwrap() == b"still the real zstd");

    // Case-insensitive name lookup.
    assert!(algo::get_compression("ZSTD").is_some());
    assert!(algo::get_compression("Zstd").is_some());

    // Missing ids surface the dedicated error kind.
    assert!(matches!(
        algo::require_compression_by_id(200),
        Err(Error::UnknownAlgorithm { .. })
    ));
    assert!(matches!(
        algo::require_encryption("rot13"),
        Err(Error::UnknownAlgorithm { .. })
    ));
}

#[test]
fn compression_mode_flag_is_set() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    {
        let mut ar = Archive::create(
            &path,
            ArchiveOptions {
                compression: Some(CompressionOptions::default()),
                ..ArchiveOptions::default()
            },
        )
        .unwrap();
        ar.add_bytes("c", b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        ar.close().unwrap();
    }
    let bytes = std::fs::read(&path).unwrap();
    // mode_flags at 0x0A: RANDOM_ACCESS | COMPRESSED.
    assert_eq!(bytes[0x0A], 0x08 | 0x04);
}
