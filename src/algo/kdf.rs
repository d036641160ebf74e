//! Built-in password KDF providers: Argon2id and PBKDF2-HMAC-SHA256.

use std::num::NonZeroU32;

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

use super::{KdfProvider, KDF_ARGON2ID, KDF_PBKDF2_HMAC_SHA256};

/// KDF cost parameters, persisted verbatim in the encryption block.
///
/// PBKDF2 uses only `iterations`; `memory_kib` and `parallelism` are stored
/// as zero for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub iterations:  i32,
    pub memory_kib:  i32,
    pub parallelism: i32,
}

impl KdfParams {
    /// Conservative Argon2id defaults for archive encryption: 64 MiB,
    /// 3 passes, single lane.
    pub fn argon2id_default() -> Self {
        Self {
            iterations:  3,
            memory_kib:  64 * 1024,
            parallelism: 1,
        }
    }

    pub fn pbkdf2_default() -> Self {
        Self {
            iterations:  600_000,
            memory_kib:  0,
            parallelism: 0,
        }
    }
}

pub struct Argon2idProvider;

impl KdfProvider for Argon2idProvider {
    fn numeric_id(&self) -> u8 {
        KDF_ARGON2ID
    }

    fn name(&self) -> &'static str {
        "argon2id"
    }

    fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<Zeroizing<[u8; 32]>> {
        if params.iterations <= 0 || params.memory_kib <= 0 || params.parallelism <= 0 {
            return Err(Error::InvalidFormat(format!(
                "invalid Argon2id parameters: t={}, m={} KiB, p={}",
                params.iterations, params.memory_kib, params.parallelism
            )));
        }
        let argon_params = Params::new(
            params.memory_kib as u32,
            params.iterations as u32,
            params.parallelism as u32,
            Some(32),
        )
        .map_err(|e| Error::InvalidFormat(format!("invalid Argon2id parameters: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

        let mut key = Zeroizing::new([0u8; 32]);
        argon2
            .hash_password_into(password, salt, key.as_mut())
            .map_err(|e| Error::InvalidFormat(format!("key derivation failed: {e}")))?;
        Ok(key)
    }
}

pub struct Pbkdf2Provider;

impl KdfProvider for Pbkdf2Provider {
    fn numeric_id(&self) -> u8 {
        KDF_PBKDF2_HMAC_SHA256
    }

    fn name(&self) -> &'static str {
        "pbkdf2-hmac-sha256"
    }

    fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<Zeroizing<[u8; 32]>> {
        let iterations = u32::try_from(params.iterations)
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "invalid PBKDF2 iteration count: {}",
                    params.iterations
                ))
            })?;

        let mut key = Zeroizing::new([0u8; 32]);
        ring::pbkdf2::derive(
            ring::pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt,
            password,
            key.as_mut(),
        );
        Ok(key)
    }
}
