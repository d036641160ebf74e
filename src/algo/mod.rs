//! Algorithm provider registry.
//!
//! # Identity rules
//! Every provider carries a frozen numeric id — the value written into
//! archive headers — and a case-insensitive string name for configuration.
//! Numeric ids are permanent; an id is never reused even if a provider is
//! retired.  A reader that cannot supply the id named by a header MUST
//! fail hard — no negotiation, no fallback.
//!
//! # Registry contract
//! The registry is the only process-wide shared state in the crate.  It is
//! read-mostly and safe under arbitrary concurrent `register`/`get` calls.
//! Built-in providers are seeded lazily on first access; `register` is
//! idempotent — the first registration for a given id or name wins.

mod compression;
mod encryption;
mod kdf;

pub use compression::{Lz4Provider, ZstdProvider, DEFAULT_COMPRESSION_LEVEL};
pub use encryption::{Aes256GcmProvider, ChaCha20Poly1305Provider, NONCE_LEN, TAG_LEN};
pub use kdf::{Argon2idProvider, KdfParams, Pbkdf2Provider};

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{Error, Result};

// ── Frozen numeric ids ───────────────────────────────────────────────────────

/// Entry payload stored verbatim.
pub const COMPRESSION_NONE: u8 = 0;
pub const COMPRESSION_ZSTD: u8 = 1;
pub const COMPRESSION_LZ4:  u8 = 2;

/// Entry payload not encrypted.
pub const ENCRYPTION_NONE:       u8 = 0;
pub const ENCRYPTION_AES256_GCM: u8 = 1;
pub const ENCRYPTION_CHACHA20:   u8 = 2;

pub const KDF_ARGON2ID:           u8 = 0;
pub const KDF_PBKDF2_HMAC_SHA256: u8 = 1;

// ── Provider traits ──────────────────────────────────────────────────────────

pub trait CompressionProvider: Send + Sync {
    fn numeric_id(&self) -> u8;
    fn name(&self) -> &'static str;
    fn compress(&self, data: &[u8], level: i32) -> Result<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// AEAD provider.  `encrypt` returns `nonce (12 B) ‖ ciphertext ‖ tag (16 B)`;
/// `decrypt` consumes the same layout and fails with
/// [`Error::DecryptionFailed`] on any tag mismatch.
pub trait EncryptionProvider: Send + Sync {
    fn numeric_id(&self) -> u8;
    fn name(&self) -> &'static str;
    fn encrypt(&self, key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, key: &[u8; 32], payload: &[u8]) -> Result<Vec<u8>>;
}

/// Password-based key derivation.  Returns a 256-bit key that is zeroed
/// when dropped.
pub trait KdfProvider: Send + Sync {
    fn numeric_id(&self) -> u8;
    fn name(&self) -> &'static str;
    fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<zeroize::Zeroizing<[u8; 32]>>;
}

// ── Registry internals ───────────────────────────────────────────────────────

struct Table<T: ?Sized> {
    by_id:   HashMap<u8, Arc<T>>,
    by_name: HashMap<String, Arc<T>>,
}

impl<T: ?Sized> Table<T> {
    fn new() -> Self {
        Self {
            by_id:   HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// First registration wins for both keys.
    fn insert(&mut self, id: u8, name: &str, provider: Arc<T>) {
        self.by_id.entry(id).or_insert_with(|| Arc::clone(&provider));
        self.by_name
            .entry(name.to_ascii_lowercase())
            .or_insert(provider);
    }
}

static COMPRESSION: OnceLock<RwLock<Table<dyn CompressionProvider>>> = OnceLock::new();
static ENCRYPTION:  OnceLock<RwLock<Table<dyn EncryptionProvider>>>  = OnceLock::new();
static KDF:         OnceLock<RwLock<Table<dyn KdfProvider>>>         = OnceLock::new();

fn compression_table() -> &'static RwLock<Table<dyn CompressionProvider>> {
    COMPRESSION.get_or_init(|| {
        let mut t: Table<dyn CompressionProvider> = Table::new();
        let zstd: Arc<dyn CompressionProvider> = Arc::new(ZstdProvider);
        let lz4:  Arc<dyn CompressionProvider> = Arc::new(Lz4Provider);
        t.insert(zstd.numeric_id(), zstd.name(), zstd);
        t.insert(lz4.numeric_id(), lz4.name(), lz4);
        RwLock::new(t)
    })
}

fn encryption_table() -> &'static RwLock<Table<dyn EncryptionProvider>> {
    ENCRYPTION.get_or_init(|| {
        let mut t: Table<dyn EncryptionProvider> = Table::new();
        let aes:    Arc<dyn EncryptionProvider> = Arc::new(Aes256GcmProvider);
        let chacha: Arc<dyn EncryptionProvider> = Arc::new(ChaCha20Poly1305Provider);
        t.insert(aes.numeric_id(), aes.name(), aes);
        t.insert(chacha.numeric_id(), chacha.name(), chacha);
        RwLock::new(t)
    })
}

fn kdf_table() -> &'static RwLock<Table<dyn KdfProvider>> {
    KDF.get_or_init(|| {
        let mut t: Table<dyn KdfProvider> = Table::new();
        let argon2: Arc<dyn KdfProvider> = Arc::new(Argon2idProvider);
        let pbkdf2: Arc<dyn KdfProvider> = Arc::new(Pbkdf2Provider);
        t.insert(argon2.numeric_id(), argon2.name(), argon2);
        t.insert(pbkdf2.numeric_id(), pbkdf2.name(), pbkdf2);
        RwLock::new(t)
    })
}

// ── Public registry surface ──────────────────────────────────────────────────

macro_rules! registry_fns {
    ($table:ident, $trait:ident, $kind:literal,
     $register:ident, $get:ident, $get_by_id:ident, $require:ident, $require_by_id:ident) => {
        /// Register an additional provider.  Idempotent: the first
        /// registration for a given id or name wins.
        pub fn $register(provider: Arc<dyn $trait>) {
            let mut t = $table().write().expect("registry lock");
            let (id, name) = (provider.numeric_id(), provider.name());
            t.insert(id, name, provider);
        }

        /// Case-insensitive lookup by name.
        pub fn $get(name: &str) -> Option<Arc<dyn $trait>> {
            let t = $table().read().expect("registry lock");
            t.by_name.get(&name.to_ascii_lowercase()).cloned()
        }

        pub fn $get_by_id(id: u8) -> Option<Arc<dyn $trait>> {
            let t = $table().read().expect("registry lock");
            t.by_id.get(&id).cloned()
        }

        pub fn $require(name: &str) -> Result<Arc<dyn $trait>> {
            $get(name).ok_or_else(|| Error::UnknownAlgorithm {
                kind: $kind,
                id:   name.to_owned(),
            })
        }

        pub fn $require_by_id(id: u8) -> Result<Arc<dyn $trait>> {
            $get_by_id(id).ok_or_else(|| Error::UnknownAlgorithm {
                kind: $kind,
                id:   id.to_string(),
            })
        }
    };
}

registry_fns!(
    compression_table, CompressionProvider, "compression",
    register_compression, get_compression, get_compression_by_id,
    require_compression, require_compression_by_id
);
registry_fns!(
    encryption_table, EncryptionProvider, "encryption",
    register_encryption, get_encryption, get_encryption_by_id,
    require_encryption, require_encryption_by_id
);
registry_fns!(
    kdf_table, KdfProvider, "kdf",
    register_kdf, get_kdf, get_kdf_by_id,
    require_kdf, require_kdf_by_id
);
