//! Reed–Solomon error correction layer.
//!
//! The codec operates on the *stored* chunk payload — whatever bytes land
//! on disk after compression and encryption.  A payload is processed in
//! super-blocks of `interleave × (255 − parity)` bytes: each super-block is
//! split round-robin into `interleave` streams, every stream is encoded
//! into an independent codeword, and the codeword bytes are merged back in
//! the same round-robin order.  A burst of `B` corrupted bytes on disk
//! therefore touches each codeword at most `⌈B / interleave⌉` times.
//!
//! The layout is self-delimiting: the reader derives every stream length
//! from the stored byte count alone, so no per-payload ECC metadata exists
//! on disk.

pub mod gf256;
mod reed_solomon;

pub use reed_solomon::{ReedSolomon, MAX_CODEWORD_LEN};

use thiserror::Error;

/// Parity bytes per codeword when ECC is enabled without explicit tuning.
pub const DEFAULT_PARITY_BYTES: u8 = 16;
/// Default interleave factor (no interleaving).
pub const DEFAULT_INTERLEAVE: u8 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EccError {
    #[error("too many errors to correct")]
    UncorrectableErrors,
    #[error("codeword of {len} bytes exceeds the GF(2^8) limit of 255")]
    InvalidCodewordLength { len: usize },
    #[error("codeword of {len} bytes is shorter than {parity} parity bytes")]
    ShortCodeword { len: usize, parity: usize },
    #[error("division by zero in GF(2^8)")]
    DivisionByZero,
    #[error("parity byte count {0} is not an even number in [2, 254]")]
    InvalidParity(usize),
    #[error("interleave factor {0} is not in [1, 16]")]
    InvalidInterleave(usize),
    #[error("stored length {0} does not describe a valid interleaved block")]
    InvalidBlockLength(usize),
}

/// Caller-facing ECC tuning, carried in archive options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EccOptions {
    /// Even, in `[2, 254]`.
    pub parity_bytes: u8,
    /// In `[1, 16]`.
    pub interleave: u8,
}

impl Default for EccOptions {
    fn default() -> Self {
        Self {
            parity_bytes: DEFAULT_PARITY_BYTES,
            interleave:   DEFAULT_INTERLEAVE,
        }
    }
}

impl EccOptions {
    pub fn codec(self) -> Result<RsCodec, EccError> {
        RsCodec::new(self.parity_bytes as usize, self.interleave as usize)
    }
}

// ── Interleaved blob codec ───────────────────────────────────────────────────

pub struct RsCodec {
    rs:         ReedSolomon,
    interleave: usize,
}

impl RsCodec {
    pub fn new(parity_bytes: usize, interleave: usize) -> Result<Self, EccError> {
        if parity_bytes < 2 || parity_bytes > 254 || parity_bytes % 2 != 0 {
            return Err(EccError::InvalidParity(parity_bytes));
        }
        if interleave < 1 || interleave > 16 {
            return Err(EccError::InvalidInterleave(interleave));
        }
        Ok(Self {
            rs: ReedSolomon::new(parity_bytes),
            interleave,
        })
    }

    #[inline]
    pub fn parity_bytes(&self) -> usize {
        self.rs.parity()
    }

    #[inline]
    pub fn interleave(&self) -> usize {
        self.interleave
    }

    /// Data bytes per full super-block.
    #[inline]
    fn stride(&self) -> usize {
        self.interleave * self.rs.max_data_len()
    }

    /// Stored bytes per full super-block.
    #[inline]
    fn stored_stride(&self) -> usize {
        self.stride() + self.interleave * self.rs.parity()
    }

    /// Stream lengths for a super-block carrying `len` data bytes.
    fn stream_lens(&self, len: usize) -> Vec<usize> {
        let f = self.interleave;
        (0..f.min(len))
            .map(|i| len / f + usize::from(i < len % f))
            .collect()
    }

    // ── Encode ──────────────────────────────────────────────────────────────

    /// Expand `data` with parity.  Empty input stays empty.
    pub fn encode_blob(&self, data: &[u8]) -> Result<Vec<u8>, EccError> {
        let mut out =
            Vec::with_capacity(data.len() + data.len().div_ceil(self.stride().max(1)) * 64);
        for block in data.chunks(self.stride()) {
            let lens = self.stream_lens(block.len());
            let mut streams: Vec<Vec<u8>> =
                lens.iter().map(|&n| Vec::with_capacity(n)).collect();
            for (i, &b) in block.iter().enumerate() {
                streams[i % self.interleave].push(b);
            }

            let codewords = streams
                .iter()
                .map(|s| self.rs.encode(s))
                .collect::<Result<Vec<_>, _>>()?;

            merge_round_robin(&codewords, &mut out);
        }
        Ok(out)
    }

    // ── Decode ──────────────────────────────────────────────────────────────

    /// Strip parity from `stored`, correcting byte errors along the way.
    pub fn decode_blob(&self, stored: &[u8]) -> Result<Vec<u8>, EccError> {
        let mut out = Vec::with_capacity(stored.len());
        for block in stored.chunks(self.stored_stride()) {
            let data_len = self.block_data_len(block.len())?;
            let lens = self.stream_lens(data_len);

            let codewords = self.split_round_robin(block, &lens);
            let datas = codewords
                .iter()
                .map(|cw| self.rs.decode(cw))
                .collect::<Result<Vec<_>, _>>()?;

            merge_round_robin(&datas, &mut out);
        }
        Ok(out)
    }

    /// True iff every codeword in `stored` has all-zero syndromes.
    pub fn verify_blob(&self, stored: &[u8]) -> bool {
        for block in stored.chunks(self.stored_stride()) {
            let Ok(data_len) = self.block_data_len(block.len()) else {
                return false;
            };
            let lens = self.stream_lens(data_len);
            let codewords = self.split_round_robin(block, &lens);
            if !codewords.iter().all(|cw| self.rs.verify(cw)) {
                return false;
            }
        }
        true
    }

    /// Recover the data length of a super-block from its stored length.
    ///
    /// A super-block with `L ≥ interleave` data bytes uses every stream, so
    /// `stored = L + interleave·parity`; a shorter one uses `L` streams of a
    /// single byte each, so `stored = L·(1 + parity)`.  The two ranges are
    /// disjoint, which makes the stored length unambiguous.
    fn block_data_len(&self, stored_len: usize) -> Result<usize, EccError> {
        let f = self.interleave;
        let p = self.rs.parity();
        if stored_len == 0 {
            return Ok(0);
        }
        if stored_len >= f * (1 + p) {
            let l = stored_len - f * p;
            if l >= f && l <= self.stride() {
                return Ok(l);
            }
        } else if stored_len % (1 + p) == 0 {
            return Ok(stored_len / (1 + p));
        }
        Err(EccError::InvalidBlockLength(stored_len))
    }

    /// Inverse of [`merge_round_robin`] for codewords of known lengths.
    fn split_round_robin(&self, block: &[u8], data_lens: &[usize]) -> Vec<Vec<u8>> {
        let p = self.rs.parity();
        let cw_lens: Vec<usize> = data_lens.iter().map(|&n| n + p).collect();
        let mut cws: Vec<Vec<u8>> =
            cw_lens.iter().map(|&n| Vec::with_capacity(n)).collect();
        let max = cw_lens.iter().copied().max().unwrap_or(0);
        let mut idx = 0;
        for r in 0..max {
            for (i, cw) in cws.iter_mut().enumerate() {
                if r < cw_lens[i] && idx < block.len() {
                    cw.push(block[idx]);
                    idx += 1;
                }
            }
        }
        cws
    }
}

/// Append the byte sequences to `out` in round-robin order: byte 0 of every
/// sequence, then byte 1, and so on.  Shorter sequences simply drop out of
/// later rounds.
fn merge_round_robin(seqs: &[Vec<u8>], out: &mut Vec<u8>) {
    let max = seqs.iter().map(Vec::len).max().unwrap_or(0);
    for r in 0..max {
        for seq in seqs {
            if r < seq.len() {
                out.push(seq[r]);
            }
        }
    }
}
