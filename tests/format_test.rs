use apack::archive::Archive;
use apack::checksum::{crc32, name_hash};
use apack::error::Error;
use apack::header::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use apack::writer::ArchiveOptions;
use tempfile::NamedTempFile;

fn temp_path() -> (NamedTempFile, std::path::PathBuf) {
    let f = NamedTempFile::new().unwrap();
    let p = f.path().to_path_buf();
    (f, p)
}

fn build_two_entry_archive(path: &std::path::Path) {
    let mut ar = Archive::create(path, ArchiveOptions::default()).unwrap();
    ar.add_bytes("x", b"payload").unwrap();
    ar.add_bytes("y", b"other data").unwrap();
    ar.close().unwrap();
}

// ── Scenario S6 ──────────────────────────────────────────────────────────────

#[test]
fn payload_corruption_is_detected_and_isolated() {
    let (_guard, path) = temp_path();
    build_two_entry_archive(&path);

    // Flip one byte inside entry "x"'s chunk payload.
    let mut bytes = std::fs::read(&path).unwrap();
    let at = bytes
        .windows(7)
        .position(|w| w == b"payload")
        .expect("plaintext payload present");
    bytes[at] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();

    let mut ar = Archive::open(&path).unwrap();
    match ar.read_all("x") {
        Err(Error::IntegrityFailure(msg)) => assert!(msg.contains("checksum")),
        other => panic!("expected IntegrityFailure, got {other:?}"),
    }
    // The session survives entry-level damage; "y" still reads.
    assert_eq!(ar.read_all("y").unwrap(), b"other data");
}

// ── TOC fidelity and trailer ─────────────────────────────────────────────────

#[test]
fn toc_records_point_at_entry_headers() {
    let (_guard, path) = temp_path();
    build_two_entry_archive(&path);
    let bytes = std::fs::read(&path).unwrap();

    let trailer_offset = i64::from_le_bytes(bytes[0x1C..0x24].try_into().unwrap()) as usize;
    assert_eq!(&bytes[trailer_offset..trailer_offset + 4], b"ATRL");

    let entry_count =
        i64::from_le_bytes(bytes[trailer_offset + 0x18..trailer_offset + 0x20].try_into().unwrap());
    assert_eq!(entry_count, 2);
    let header_entry_count = i64::from_le_bytes(bytes[0x14..0x1C].try_into().unwrap());
    assert_eq!(header_entry_count, 2);

    let toc_offset =
        i64::from_le_bytes(bytes[trailer_offset + 0x08..trailer_offset + 0x10].try_into().unwrap())
            as usize;
    assert_eq!(toc_offset, trailer_offset + 64);

    let mut ar = Archive::open(&path).unwrap();
    let entries = ar.entries().unwrap();

    for (i, entry) in entries.iter().enumerate() {
        let rec = &bytes[toc_offset + i * 40..toc_offset + (i + 1) * 40];
        let id = u64::from_le_bytes(rec[..8].try_into().unwrap());
        let entry_offset = u64::from_le_bytes(rec[8..16].try_into().unwrap()) as usize;
        let original_size = u64::from_le_bytes(rec[16..24].try_into().unwrap());
        let stored_size = u64::from_le_bytes(rec[24..32].try_into().unwrap());
        let hash = u32::from_le_bytes(rec[32..36].try_into().unwrap());

        assert_eq!(id, entry.id);
        // The record points at the first byte of the entry's ENTR magic.
        assert_eq!(&bytes[entry_offset..entry_offset + 4], b"ENTR");
        assert_eq!(original_size, entry.original_size);
        assert_eq!(stored_size, entry.stored_size);
        assert_eq!(hash, name_hash(&entry.name));
    }
}

#[test]
fn entry_headers_are_eight_byte_aligned() {
    let (_guard, path) = temp_path();
    {
        let mut ar = Archive::create(&path, ArchiveOptions::default()).unwrap();
        // Names of varying length push the tail across every padding case.
        for len in 1..=9usize {
            let name: String = "n".repeat(len);
            ar.add_bytes(&name, b"z").unwrap();
        }
        ar.close().unwrap();
    }
    let bytes = std::fs::read(&path).unwrap();

    let trailer_offset = i64::from_le_bytes(bytes[0x1C..0x24].try_into().unwrap()) as usize;
    let toc_offset = trailer_offset + 64;
    for i in 0..9usize {
        let rec = &bytes[toc_offset + i * 40..toc_offset + (i + 1) * 40];
        let entry_offset = u64::from_le_bytes(rec[8..16].try_into().unwrap()) as usize;
        // Walk from the fixed prefix to the first chunk header and check
        // the distance is a multiple of 8.
        let name_len =
            u16::from_le_bytes(bytes[entry_offset + 0x26..entry_offset + 0x28].try_into().unwrap())
                as usize;
        let mime_len =
            u16::from_le_bytes(bytes[entry_offset + 0x28..entry_offset + 0x2A].try_into().unwrap())
                as usize;
        let unpadded = 48 + name_len + mime_len;
        let padded = unpadded.next_multiple_of(8);
        assert_eq!(&bytes[entry_offset + padded..entry_offset + padded + 4], b"CHNK");
    }
}

// ── Limits ───────────────────────────────────────────────────────────────────

#[test]
fn name_length_limits() {
    let (_guard, path) = temp_path();
    let mut ar = Archive::create(&path, ArchiveOptions::default()).unwrap();

    // Length 0 is rejected.
    match ar.add_bytes("", b"x") {
        Err(Error::InvalidFormat(msg)) => assert!(msg.contains("name")),
        other => panic!("expected InvalidFormat, got {other:?}"),
    }

    // Lengths 1 and 65535 are both accepted.
    ar.add_bytes("a", b"one byte name").unwrap();
    let long_name = "n".repeat(65_535);
    ar.add_bytes(&long_name, b"max name").unwrap();

    // 65536 bytes exceed the u16 length prefix.
    let too_long = "n".repeat(65_536);
    assert!(matches!(ar.add_bytes(&too_long, b"x"), Err(Error::ValueTooLarge(_))));
    ar.close().unwrap();

    let mut ar = Archive::open(&path).unwrap();
    assert_eq!(ar.read_all("a").unwrap(), b"one byte name");
    assert_eq!(ar.read_all(&long_name).unwrap(), b"max name");
}

#[test]
fn chunk_size_limits() {
    // Both limits are accepted …
    for chunk_size in [MIN_CHUNK_SIZE, MAX_CHUNK_SIZE] {
        let (_guard, path) = temp_path();
        let options = ArchiveOptions {
            chunk_size,
            ..ArchiveOptions::default()
        };
        let mut ar = Archive::create(&path, options).unwrap();
        ar.add_bytes("x", b"data").unwrap();
        ar.close().unwrap();
        let mut ar = Archive::open(&path).unwrap();
        assert_eq!(ar.read_all("x").unwrap(), b"data");
    }

    // … and values outside the range are not.
    for chunk_size in [MIN_CHUNK_SIZE - 1, MAX_CHUNK_SIZE + 1] {
        let (_guard, path) = temp_path();
        let options = ArchiveOptions {
            chunk_size,
            ..ArchiveOptions::default()
        };
        assert!(matches!(
            Archive::create(&path, options),
            Err(Error::ValueTooLarge(_))
        ));
    }
}

#[test]
fn mime_type_limit() {
    let (_guard, path) = temp_path();
    let mut ar = Archive::create(&path, ArchiveOptions::default()).unwrap();
    let meta = apack::Entry::new("m").with_mime_type("x".repeat(256));
    assert!(matches!(ar.add_entry(meta, b""), Err(Error::ValueTooLarge(_))));
    ar.close().unwrap();
}

// ── Structural rejection ─────────────────────────────────────────────────────

#[test]
fn rejects_foreign_bytes() {
    let (_guard, path) = temp_path();
    std::fs::write(&path, b"PK\x03\x04 definitely not an apack archive").unwrap();
    match Archive::open(&path) {
        Err(Error::InvalidFormat(msg)) => assert!(msg.contains("APACK")),
        other => panic!("expected InvalidFormat, got {other:?}"),
    }
}

#[test]
fn rejects_newer_compat_level() {
    let (_guard, path) = temp_path();
    build_two_entry_archive(&path);

    // Bump compat_level (byte 0x09) and fix up the header CRC over
    // bytes 0x00..0x10.
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0x09] = 9;
    let crc = crc32(&bytes[..0x10]);
    bytes[0x10..0x14].copy_from_slice(&crc.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    match Archive::open(&path) {
        Err(Error::UnsupportedVersion { required, supported }) => {
            assert_eq!(required, 9);
            assert_eq!(supported, 1);
        }
        other => panic!("expected UnsupportedVersion, got {other:?}"),
    }
}

#[test]
fn corrupted_file_header_checksum_is_fatal() {
    let (_guard, path) = temp_path();
    build_two_entry_archive(&path);

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0x0C] ^= 0xFF; // chunk_size byte, CRC not recomputed
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(Archive::open(&path), Err(Error::IntegrityFailure(_))));
}

#[test]
fn truncated_archive_reports_structural_damage() {
    let (_guard, path) = temp_path();
    build_two_entry_archive(&path);

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

    // The trailer no longer sits where the header claims.
    assert!(Archive::open(&path).is_err());
}

#[test]
fn corrupted_entry_header_is_detected() {
    let (_guard, path) = temp_path();
    build_two_entry_archive(&path);

    // Entry "x" starts at offset 64; flip a byte in its name field
    // (offset 48 within the header).
    let mut bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[64..68], b"ENTR");
    bytes[64 + 48] = b'q';
    std::fs::write(&path, &bytes).unwrap();

    let mut ar = Archive::open(&path).unwrap();
    // Lookup by the original name follows the TOC hash to the damaged
    // header and trips its checksum.
    assert!(matches!(
        ar.read_all("x"),
        Err(Error::IntegrityFailure(_)) | Err(Error::EntryNotFound(_))
    ));
    // The sibling entry is unaffected.
    assert_eq!(ar.read_all("y").unwrap(), b"other data");
}
