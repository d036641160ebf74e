//! AES Key Wrap (RFC 3394) over AES-256.
//!
//! The wrap transform adds an 8-byte integrity block: wrapping a 32-byte
//! key yields 40 bytes.  Unwrapping recomputes the integrity block; any
//! mismatch — wrong KEK or altered ciphertext — is reported as the uniform
//! [`Error::DecryptionFailed`], deliberately indistinguishable from a wrong
//! password.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use zeroize::Zeroize;

use crate::error::{Error, Result};

/// RFC 3394 §2.2.3 initial value.
const IV: [u8; 8] = [0xA6; 8];

/// Wrap `key` (a multiple of 8 bytes, at least 16) under `kek`.
pub fn wrap(kek: &[u8; 32], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() < 16 || key.len() % 8 != 0 {
        return Err(Error::InvalidFormat(format!(
            "key wrap input must be a multiple of 8 bytes and at least 16, got {}",
            key.len()
        )));
    }
    let cipher = Aes256::new(GenericArray::from_slice(kek));
    let n = key.len() / 8;

    let mut a = IV;
    let mut r: Vec<[u8; 8]> = key.chunks_exact(8).map(|c| c.try_into().unwrap()).collect();

    let mut block = [0u8; 16];
    for j in 0..6u64 {
        for (i, ri) in r.iter_mut().enumerate() {
            block[..8].copy_from_slice(&a);
            block[8..].copy_from_slice(ri);
            cipher.encrypt_block(GenericArray::from_mut_slice(&mut block));

            let t = (n as u64) * j + (i as u64 + 1);
            a.copy_from_slice(&block[..8]);
            let msb = u64::from_be_bytes(a) ^ t;
            a = msb.to_be_bytes();
            ri.copy_from_slice(&block[8..]);
        }
    }
    block.zeroize();

    let mut out = Vec::with_capacity(8 + key.len());
    out.extend_from_slice(&a);
    for ri in &mut r {
        out.extend_from_slice(ri);
        ri.zeroize();
    }
    Ok(out)
}

/// Unwrap an RFC 3394 ciphertext.  Returns the plaintext key bytes wrapped
/// in a zeroizing buffer path by the caller.
pub fn unwrap(kek: &[u8; 32], wrapped: &[u8]) -> Result<Vec<u8>> {
    if wrapped.len() < 24 || wrapped.len() % 8 != 0 {
        return Err(Error::DecryptionFailed);
    }
    let cipher = Aes256::new(GenericArray::from_slice(kek));
    let n = wrapped.len() / 8 - 1;

    let mut a: [u8; 8] = wrapped[..8].try_into().unwrap();
    let mut r: Vec<[u8; 8]> = wrapped[8..]
        .chunks_exact(8)
        .map(|c| c.try_into().unwrap())
        .collect();

    let mut block = [0u8; 16];
    for j in (0..6u64).rev() {
        for i in (0..n).rev() {
            let t = (n as u64) * j + (i as u64 + 1);
            let msb = u64::from_be_bytes(a) ^ t;
            block[..8].copy_from_slice(&msb.to_be_bytes());
            block[8..].copy_from_slice(&r[i]);
            cipher.decrypt_block(GenericArray::from_mut_slice(&mut block));

            a.copy_from_slice(&block[..8]);
            r[i].copy_from_slice(&block[8..]);
        }
    }
    block.zeroize();

    if a != IV {
        for ri in &mut r {
            ri.zeroize();
        }
        return Err(Error::DecryptionFailed);
    }

    let mut out = Vec::with_capacity(n * 8);
    for ri in &mut r {
        out.extend_from_slice(ri);
        ri.zeroize();
    }
    Ok(out)
}
