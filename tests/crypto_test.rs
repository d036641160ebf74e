use apack::algo::{self, KdfParams};
use apack::archive::Archive;
use apack::crypto::{key_wrap, EncryptionRecord};
use apack::error::Error;
use apack::writer::{ArchiveOptions, EncryptionOptions};
use tempfile::NamedTempFile;

/// Cheap Argon2id parameters so the tests stay fast; production defaults
/// live in `KdfParams::argon2id_default`.
fn fast_argon2() -> KdfParams {
    KdfParams {
        iterations:  1,
        memory_kib:  1024,
        parallelism: 1,
    }
}

fn encrypted_options(password: &str, cipher: u8, kdf: u8, params: KdfParams) -> ArchiveOptions {
    ArchiveOptions {
        encryption: Some(EncryptionOptions {
            password: password.to_owned(),
            cipher,
            kdf,
            params,
        }),
        ..ArchiveOptions::default()
    }
}

fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 8) as u8
        })
        .collect()
}

// ── Scenario S4 ──────────────────────────────────────────────────────────────

#[test]
fn encrypted_roundtrip_and_wrong_password() {
    let data = pseudo_random(1024, 99);
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    {
        let mut ar = Archive::create(
            &path,
            encrypted_options("correct horse", algo::ENCRYPTION_AES256_GCM, algo::KDF_ARGON2ID, fast_argon2()),
        )
        .unwrap();
        ar.add_bytes("secret.bin", &data).unwrap();
        ar.close().unwrap();
    }

    // Correct password: bytes come back.
    let mut ar = Archive::open_encrypted(&path, "correct horse").unwrap();
    assert_eq!(ar.read_all("secret.bin").unwrap(), data);

    // Wrong password: unwrap fails, and the message never says whether the
    // password or the data was at fault.
    let err = Archive::open_encrypted(&path, "tr0ub4dor &3").unwrap_err();
    match &err {
        Error::DecryptionFailed => {}
        other => panic!("expected DecryptionFailed, got {other:?}"),
    }
    let msg = err.to_string().to_lowercase();
    assert!(!msg.contains("password is wrong"));
    assert!(!msg.contains("unwrap"));
    assert!(msg.contains("wrong password or corrupted data"));
}

#[test]
fn reading_without_password_fails_opaquely() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    {
        let mut ar = Archive::create(
            &path,
            encrypted_options("pw", algo::ENCRYPTION_AES256_GCM, algo::KDF_ARGON2ID, fast_argon2()),
        )
        .unwrap();
        ar.add_bytes("s", b"locked").unwrap();
        ar.close().unwrap();
    }

    // Open without a password, then try to read: key unwrap was deferred.
    let mut ar = Archive::open(&path).unwrap();
    assert!(matches!(ar.read_all("s"), Err(Error::DecryptionFailed)));

    // Late unlock succeeds.
    ar.unlock("pw").unwrap();
    assert_eq!(ar.read_all("s").unwrap(), b"locked");
}

#[test]
fn chacha20_poly1305_roundtrip() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    {
        let mut ar = Archive::create(
            &path,
            encrypted_options("pw", algo::ENCRYPTION_CHACHA20, algo::KDF_ARGON2ID, fast_argon2()),
        )
        .unwrap();
        ar.add_bytes("c", b"chacha sealed").unwrap();
        ar.close().unwrap();
    }
    let mut ar = Archive::open_encrypted(&path, "pw").unwrap();
    assert_eq!(ar.read_all("c").unwrap(), b"chacha sealed");
}

#[test]
fn pbkdf2_kdf_roundtrip() {
    let params = KdfParams {
        iterations:  1000,
        memory_kib:  0,
        parallelism: 0,
    };
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    {
        let mut ar = Archive::create(
            &path,
            encrypted_options("pw", algo::ENCRYPTION_AES256_GCM, algo::KDF_PBKDF2_HMAC_SHA256, params),
        )
        .unwrap();
        ar.add_bytes("p", b"pbkdf2 sealed").unwrap();
        ar.close().unwrap();
    }
    let mut ar = Archive::open_encrypted(&path, "pw").unwrap();
    assert_eq!(ar.read_all("p").unwrap(), b"pbkdf2 sealed");
}

#[test]
fn tampered_wrap_tag_reads_like_wrong_password() {
    let tmp = NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();
    {
        let mut ar = Archive::create(
            &path,
            encrypted_options("pw", algo::ENCRYPTION_AES256_GCM, algo::KDF_ARGON2ID, fast_argon2()),
        )
        .unwrap();
        ar.add_bytes("t", b"tamper target").unwrap();
        ar.close().unwrap();
    }

    // ENCR block sits right after the 64-byte header; its record is
    // 0x18 fixed + 32 salt + 40 wrapped key + 16 tag.  Flip the tag's
    // final byte.
    let mut bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[64..68], b"ENCR");
    let tag_end = 64 + 0x18 + 32 + 40 + 16;
    bytes[tag_end - 1] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();

    let wrong_pw = Archive::open_encrypted(&path, "nope").unwrap_err();
    let tampered = Archive::open_encrypted(&path, "pw").unwrap_err();
    // Same kind, same rendered message: no oracle.
    assert_eq!(wrong_pw.to_string(), tampered.to_string());
    assert!(matches!(tampered, Error::DecryptionFailed));
}

// ── Key wrap (RFC 3394) ──────────────────────────────────────────────────────

#[test]
fn key_wrap_matches_rfc_3394_vector() {
    // RFC 3394 §4.3: 128-bit key data wrapped with a 256-bit KEK.
    let kek: [u8; 32] = core::array::from_fn(|i| i as u8);
    let key: [u8; 16] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
        0xEE, 0xFF,
    ];
    let expected: [u8; 24] = [
        0x64, 0xE8, 0xC3, 0xF9, 0xCE, 0x0F, 0x5B, 0xA2, 0x63, 0xE9, 0x77, 0x79, 0x05, 0x81,
        0x8A, 0x2A, 0x93, 0xC8, 0x19, 0x1E, 0x7D, 0x6E, 0x8A, 0xE7,
    ];

    let wrapped = key_wrap::wrap(&kek, &key).unwrap();
    assert_eq!(wrapped, expected);
    assert_eq!(key_wrap::unwrap(&kek, &wrapped).unwrap(), key);
}

#[test]
fn key_wrap_rejects_altered_ciphertext_and_wrong_kek() {
    let kek = [0x42u8; 32];
    let key = [0x17u8; 32];
    let wrapped = key_wrap::wrap(&kek, &key).unwrap();
    assert_eq!(wrapped.len(), 40);
    assert_eq!(key_wrap::unwrap(&kek, &wrapped).unwrap(), key);

    let mut altered = wrapped.clone();
    altered[11] ^= 0x80;
    assert!(matches!(
        key_wrap::unwrap(&kek, &altered),
        Err(Error::DecryptionFailed)
    ));

    let mut wrong_kek = kek;
    wrong_kek[0] ^= 1;
    assert!(matches!(
        key_wrap::unwrap(&wrong_kek, &wrapped),
        Err(Error::DecryptionFailed)
    ));
}

// ── Encryption record ────────────────────────────────────────────────────────

#[test]
fn record_unwraps_only_with_matching_password_salt_and_params() {
    let (record, dek) =
        EncryptionRecord::create("hunter2", algo::KDF_ARGON2ID, algo::ENCRYPTION_AES256_GCM, fast_argon2())
            .unwrap();
    drop(dek);

    // Round trip through the same record.
    assert!(record.unwrap_dek("hunter2").is_ok());
    assert!(matches!(record.unwrap_dek("hunter3"), Err(Error::DecryptionFailed)));

    // Altered salt: the derived KEK changes, so the integrity check fails.
    let mut salted = record.clone();
    salted.salt[0] ^= 1;
    assert!(matches!(salted.unwrap_dek("hunter2"), Err(Error::DecryptionFailed)));

    // Altered wrap tag fails before the KDF even runs.
    let mut tagged = record;
    tagged.wrap_tag[3] ^= 1;
    assert!(matches!(tagged.unwrap_dek("hunter2"), Err(Error::DecryptionFailed)));
}
