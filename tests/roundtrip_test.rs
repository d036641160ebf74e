use std::io::Write;

use apack::archive::Archive;
use apack::checksum::ChecksumAlgorithm;
use apack::entry::{AttrValue, Entry};
use apack::error::Error;
use apack::writer::{ArchiveMode, ArchiveOptions, CompressionOptions};
use tempfile::NamedTempFile;

fn temp_path() -> (NamedTempFile, std::path::PathBuf) {
    let f = NamedTempFile::new().unwrap();
    let p = f.path().to_path_buf();
    (f, p)
}

#[test]
fn minimal_archive_bytes_are_exact() {
    // Scenario S1: one entry, no compression, no encryption.
    let (_guard, path) = temp_path();
    {
        let mut ar = Archive::create(&path, ArchiveOptions::default()).unwrap();
        ar.add_bytes("hello.txt", b"Hello, World!").unwrap();
        ar.close().unwrap();
    }

    let bytes = std::fs::read(&path).unwrap();

    // Magic plus null terminator.
    assert_eq!(&bytes[..6], &[0x41, 0x50, 0x41, 0x43, 0x4B, 0x00]);

    // Entry header magic right after the 64-byte file header.
    assert_eq!(&bytes[64..68], b"ENTR");

    // Entry header: 48 fixed + 9 name bytes, padded to 64.  Chunk header
    // follows at offset 128.
    assert_eq!(&bytes[128..132], b"CHNK");
    let chunk_index = u32::from_le_bytes(bytes[132..136].try_into().unwrap());
    let original_size = u32::from_le_bytes(bytes[136..140].try_into().unwrap());
    let stored_size = u32::from_le_bytes(bytes[140..144].try_into().unwrap());
    let checksum = u32::from_le_bytes(bytes[144..148].try_into().unwrap());
    let flags = u32::from_le_bytes(bytes[148..152].try_into().unwrap());
    assert_eq!(chunk_index, 0);
    assert_eq!(original_size, 13);
    assert_eq!(stored_size, 13);
    assert_eq!(checksum, 0xEC4A_C3D0); // CRC32("Hello, World!")
    assert_eq!(flags, 0x01); // LAST only

    // Trailer magic at trailer_offset.
    let trailer_offset = i64::from_le_bytes(bytes[0x1C..0x24].try_into().unwrap()) as usize;
    assert_eq!(&bytes[trailer_offset..trailer_offset + 4], b"ATRL");

    // The trailer's file_size equals the actual length.
    let file_size =
        i64::from_le_bytes(bytes[trailer_offset + 0x38..trailer_offset + 0x40].try_into().unwrap());
    assert_eq!(file_size as usize, bytes.len());
}

#[test]
fn two_entry_roundtrip_and_missing_lookup() {
    // Scenario S2.
    let (_guard, path) = temp_path();
    {
        let mut ar = Archive::create(&path, ArchiveOptions::default()).unwrap();
        ar.add_bytes("a.txt", b"A").unwrap();
        ar.add_bytes("b.txt", b"B").unwrap();
        ar.close().unwrap();
    }

    let mut ar = Archive::open(&path).unwrap();
    let entries = ar.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "a.txt");
    assert_eq!(entries[1].name, "b.txt");
    assert_eq!(entries[0].id, 1);
    assert_eq!(entries[1].id, 2);

    assert_eq!(ar.read_all("a.txt").unwrap(), b"A");
    assert_eq!(ar.read_all("b.txt").unwrap(), b"B");

    match ar.read_all("missing.txt") {
        Err(Error::EntryNotFound(name)) => assert_eq!(name, "missing.txt"),
        other => panic!("expected EntryNotFound, got {other:?}"),
    }
}

#[test]
fn unicode_entry_name() {
    // Scenario S3.
    let name = "文件/данные/αρχείο.txt";
    let (_guard, path) = temp_path();
    {
        let mut ar = Archive::create(&path, ArchiveOptions::default()).unwrap();
        ar.add_bytes(name, b"Unicode content").unwrap();
        ar.close().unwrap();
    }

    let mut ar = Archive::open(&path).unwrap();
    assert!(ar.has_entry(name).unwrap());
    assert_eq!(ar.read_all(name).unwrap(), b"Unicode content");
}

#[test]
fn empty_entry_is_one_last_chunk() {
    let (_guard, path) = temp_path();
    {
        let mut ar = Archive::create(&path, ArchiveOptions::default()).unwrap();
        ar.add_bytes("empty", b"").unwrap();
        ar.close().unwrap();
    }

    let mut ar = Archive::open(&path).unwrap();
    let entries = ar.entries().unwrap();
    assert_eq!(entries[0].chunk_count, 1);
    assert_eq!(entries[0].original_size, 0);
    assert_eq!(ar.read_all("empty").unwrap(), Vec::<u8>::new());
}

#[test]
fn data_of_exactly_one_chunk_gets_empty_last_chunk() {
    let (_guard, path) = temp_path();
    let options = ArchiveOptions {
        chunk_size: 1024,
        ..ArchiveOptions::default()
    };
    let data = vec![0xABu8; 1024];
    {
        let mut ar = Archive::create(&path, options).unwrap();
        ar.add_bytes("exact", &data).unwrap();
        ar.close().unwrap();
    }

    let mut ar = Archive::open(&path).unwrap();
    let entries = ar.entries().unwrap();
    assert_eq!(entries[0].chunk_count, 2);
    assert_eq!(entries[0].original_size, 1024);
    assert_eq!(ar.read_all("exact").unwrap(), data);
}

#[test]
fn multi_chunk_streaming_write() {
    let (_guard, path) = temp_path();
    let options = ArchiveOptions {
        chunk_size: 1024,
        ..ArchiveOptions::default()
    };
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    {
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = apack::create_archive(file, &options).unwrap();
        let mut stream = writer.add_entry(Entry::new("big.bin")).unwrap();
        // Exercise the std::io::Write surface in odd-sized slices.
        for piece in data.chunks(777) {
            stream.write_all(piece).unwrap();
        }
        let entry = stream.finish().unwrap();
        assert_eq!(entry.original_size, data.len() as u64);
        assert_eq!(entry.chunk_count, 10); // 9 full chunks + final partial
        writer.close().unwrap();
    }

    let mut ar = Archive::open(&path).unwrap();
    assert_eq!(ar.read_all("big.bin").unwrap(), data);
}

#[test]
fn compressed_roundtrip_zstd_and_lz4() {
    for algorithm in [1u8, 2u8] {
        let (_guard, path) = temp_path();
        let options = ArchiveOptions {
            compression: Some(CompressionOptions {
                algorithm,
                level: 3,
            }),
            ..ArchiveOptions::default()
        };
        let data = b"repeat repeat repeat repeat repeat repeat repeat".repeat(64);
        {
            let mut ar = Archive::create(&path, options).unwrap();
            ar.add_bytes("text", &data).unwrap();
            ar.close().unwrap();
        }

        let mut ar = Archive::open(&path).unwrap();
        let entries = ar.entries().unwrap();
        assert!(entries[0].stored_size < entries[0].original_size);
        assert_eq!(ar.read_all("text").unwrap(), data);
    }
}

#[test]
fn incompressible_chunk_stays_raw() {
    let (_guard, path) = temp_path();
    let options = ArchiveOptions {
        compression: Some(CompressionOptions::default()),
        ..ArchiveOptions::default()
    };
    // High-entropy bytes that zstd cannot shrink.
    let mut state = 0x9E37_79B9u32;
    let data: Vec<u8> = (0..4096)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 8) as u8
        })
        .collect();
    {
        let mut ar = Archive::create(&path, options).unwrap();
        ar.add_bytes("noise", &data).unwrap();
        ar.close().unwrap();
    }

    let mut ar = Archive::open(&path).unwrap();
    let entries = ar.entries().unwrap();
    // Stored verbatim: the per-chunk decision cleared the COMPRESSED flag.
    assert_eq!(entries[0].stored_size, entries[0].original_size);
    assert_eq!(ar.read_all("noise").unwrap(), data);
}

#[test]
fn xxh3_checksum_algorithms_roundtrip() {
    for checksum in [ChecksumAlgorithm::Xxh3_64, ChecksumAlgorithm::Xxh3_128] {
        let (_guard, path) = temp_path();
        let options = ArchiveOptions {
            checksum,
            ..ArchiveOptions::default()
        };
        {
            let mut ar = Archive::create(&path, options).unwrap();
            ar.add_bytes("x", b"checksummed").unwrap();
            ar.close().unwrap();
        }
        let mut ar = Archive::open(&path).unwrap();
        assert_eq!(ar.read_all("x").unwrap(), b"checksummed");
    }
}

#[test]
fn attributes_roundtrip_all_types() {
    let (_guard, path) = temp_path();
    let meta = Entry::new("attrs")
        .with_mime_type("application/octet-stream")
        .with_attribute("title", AttrValue::String("The Title".into()))
        .with_attribute("count", AttrValue::Int64(-42))
        .with_attribute("ratio", AttrValue::Float64(0.75))
        .with_attribute("flag", AttrValue::Bool(true))
        .with_attribute("blob", AttrValue::Bytes(vec![1, 2, 3, 4]));
    {
        let mut ar = Archive::create(&path, ArchiveOptions::default()).unwrap();
        ar.add_entry(meta, b"payload").unwrap();
        ar.close().unwrap();
    }

    let mut ar = Archive::open(&path).unwrap();
    let entries = ar.entries().unwrap();
    let e = &entries[0];
    assert_eq!(e.mime_type, "application/octet-stream");
    assert_eq!(e.attribute("title"), Some(&AttrValue::String("The Title".into())));
    assert_eq!(e.attribute("count"), Some(&AttrValue::Int64(-42)));
    assert_eq!(e.attribute("ratio"), Some(&AttrValue::Float64(0.75)));
    assert_eq!(e.attribute("flag"), Some(&AttrValue::Bool(true)));
    assert_eq!(e.attribute("blob"), Some(&AttrValue::Bytes(vec![1, 2, 3, 4])));
    assert_eq!(e.attribute("nope"), None);
}

#[test]
fn stream_mode_roundtrip() {
    let (_guard, path) = temp_path();
    let options = ArchiveOptions {
        mode: ArchiveMode::Stream,
        ..ArchiveOptions::default()
    };
    {
        let mut ar = Archive::create(&path, options).unwrap();
        ar.add_bytes("one", b"first entry").unwrap();
        ar.add_bytes("two", b"second entry").unwrap();
        ar.close().unwrap();
    }

    let mut ar = Archive::open(&path).unwrap();
    let entries = ar.entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "one");
    assert_eq!(entries[1].name, "two");
    assert_eq!(ar.read_all("one").unwrap(), b"first entry");
    assert_eq!(ar.read_all("two").unwrap(), b"second entry");
}

#[test]
fn open_entry_streams_with_io_read() {
    use std::io::Read;

    let (_guard, path) = temp_path();
    let options = ArchiveOptions {
        chunk_size: 1024,
        ..ArchiveOptions::default()
    };
    let data: Vec<u8> = (0..5000u32).map(|i| (i % 199) as u8).collect();
    {
        let mut ar = Archive::create(&path, options).unwrap();
        ar.add_bytes("streamed", &data).unwrap();
        ar.close().unwrap();
    }

    let mut ar = Archive::open(&path).unwrap();
    let reader = ar.reader().unwrap();
    let entry = reader.require_by_name("streamed").unwrap();
    let mut stream = reader.open_entry(&entry).unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
}
