//! Key containers with guaranteed zeroing on drop.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// The per-archive data-encryption key.
///
/// A `Dek` is exclusively owned by one archive session: it is not `Clone`,
/// its bytes are overwritten with zeros when it is dropped (including on
/// panic unwind), and it never appears in `Debug` output.
pub struct Dek {
    bytes: Zeroizing<[u8; 32]>,
}

impl Dek {
    /// Draw a fresh random 256-bit key from the OS RNG.
    pub(crate) fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(bytes.as_mut());
        Self { bytes }
    }

    pub(crate) fn from_bytes(bytes: Zeroizing<[u8; 32]>) -> Self {
        Self { bytes }
    }

    #[inline]
    pub(crate) fn expose(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl std::fmt::Debug for Dek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Dek(..)")
    }
}
