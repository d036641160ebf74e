//! Systematic Reed–Solomon encoder and decoder over GF(2⁸).
//!
//! A codeword is `data ‖ parity` with `data.len() + parity ≤ 255`.  The
//! generator polynomial is `g(x) = Π_{i=0}^{p-1} (x − αⁱ)`; parity is the
//! remainder of `data·xᵖ` divided by `g(x)`.  Decoding runs the classic
//! syndrome → Berlekamp–Massey → Chien search → Forney chain and corrects
//! up to `p/2` byte errors at unknown positions.
//!
//! Byte order convention: the first byte of a codeword is the coefficient
//! of the highest power of x.  Syndromes are `S_i = R(αⁱ)` for `i < p`.
//!
//! After applying corrections the decoder recomputes the syndromes and
//! refuses the word if they are not all zero, so a word beyond the design
//! distance fails loudly rather than miscorrecting in the checked cases.

use super::gf256;
use super::EccError;

/// Largest total codeword length representable in GF(2⁸).
pub const MAX_CODEWORD_LEN: usize = 255;

pub struct ReedSolomon {
    parity: usize,
    /// Generator polynomial, highest-degree coefficient first; `gen[0] == 1`.
    generator: Vec<u8>,
}

impl ReedSolomon {
    /// `parity` must be even and in `[2, 254]`; validated by the caller
    /// (see [`super::RsCodec::new`]).
    pub(crate) fn new(parity: usize) -> Self {
        // g(x) = Π (x − αⁱ), built by repeated multiplication.
        let mut generator = vec![1u8];
        for i in 0..parity {
            let root = gf256::alpha_pow(i);
            let mut next = vec![0u8; generator.len() + 1];
            for (j, &g) in generator.iter().enumerate() {
                next[j] ^= g;
                next[j + 1] ^= gf256::mul(g, root);
            }
            generator = next;
        }
        Self { parity, generator }
    }

    #[inline]
    pub fn parity(&self) -> usize {
        self.parity
    }

    /// Largest data length a single codeword can carry.
    #[inline]
    pub fn max_data_len(&self) -> usize {
        MAX_CODEWORD_LEN - self.parity
    }

    // ── Encoding ────────────────────────────────────────────────────────────

    /// Systematic encode: returns `data ‖ parity`.
    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>, EccError> {
        if data.len() + self.parity > MAX_CODEWORD_LEN {
            return Err(EccError::InvalidCodewordLength {
                len: data.len() + self.parity,
            });
        }

        // Polynomial long division of data·xᵖ by g(x); the running
        // remainder is the parity.
        let mut rem = vec![0u8; self.parity];
        for &d in data {
            let coef = d ^ rem[0];
            rem.rotate_left(1);
            rem[self.parity - 1] = 0;
            if coef != 0 {
                for (j, r) in rem.iter_mut().enumerate() {
                    *r ^= gf256::mul(coef, self.generator[j + 1]);
                }
            }
        }

        let mut out = Vec::with_capacity(data.len() + self.parity);
        out.extend_from_slice(data);
        out.extend_from_slice(&rem);
        Ok(out)
    }

    // ── Syndromes ───────────────────────────────────────────────────────────

    /// `S_i = R(αⁱ)` for `i ∈ [0, p)`, Horner evaluation from the
    /// highest-degree byte.
    fn syndromes(&self, word: &[u8]) -> Vec<u8> {
        (0..self.parity)
            .map(|i| {
                let x = gf256::alpha_pow(i);
                word.iter().fold(0u8, |acc, &b| gf256::mul(acc, x) ^ b)
            })
            .collect()
    }

    /// Fast integrity check: true iff every syndrome is zero.  Never
    /// materializes corrected data.
    pub fn verify(&self, word: &[u8]) -> bool {
        if word.len() > MAX_CODEWORD_LEN || word.len() < self.parity {
            return false;
        }
        self.syndromes(word).iter().all(|&s| s == 0)
    }

    // ── Decoding ────────────────────────────────────────────────────────────

    /// Correct up to `p/2` byte errors and return the data prefix.
    pub fn decode(&self, word: &[u8]) -> Result<Vec<u8>, EccError> {
        if word.len() > MAX_CODEWORD_LEN {
            return Err(EccError::InvalidCodewordLength { len: word.len() });
        }
        if word.len() < self.parity {
            return Err(EccError::ShortCodeword {
                len:    word.len(),
                parity: self.parity,
            });
        }
        let data_len = word.len() - self.parity;

        let synd = self.syndromes(word);
        if synd.iter().all(|&s| s == 0) {
            return Ok(word[..data_len].to_vec());
        }

        // Berlekamp–Massey: error-locator Λ(x), lowest-degree first.
        let lambda = berlekamp_massey(&synd)?;
        let errors = lambda.len() - 1;
        if errors * 2 > self.parity {
            return Err(EccError::UncorrectableErrors);
        }

        // Chien search: byte k corresponds to locator X = α^(N−1−k); k is
        // an error position iff Λ(X⁻¹) = 0.
        let n = word.len();
        let mut positions = Vec::with_capacity(errors);
        for k in 0..n {
            let x_inv = gf256::alpha_pow_neg(n - 1 - k);
            if gf256::poly_eval_low(&lambda, x_inv) == 0 {
                positions.push(k);
            }
        }
        if positions.len() != errors {
            return Err(EccError::UncorrectableErrors);
        }

        // Forney: Ω(x) = S(x)·Λ(x) mod xᵖ, then
        // e_k = X_k · Ω(X_k⁻¹) / Λ'(X_k⁻¹).
        let omega = poly_mul_mod(&synd, &lambda, self.parity);
        let lambda_deriv = formal_derivative(&lambda);

        let mut corrected = word.to_vec();
        for &k in &positions {
            let exp = n - 1 - k;
            let x = gf256::alpha_pow(exp);
            let x_inv = gf256::alpha_pow_neg(exp);
            let num = gf256::mul(x, gf256::poly_eval_low(&omega, x_inv));
            let den = gf256::poly_eval_low(&lambda_deriv, x_inv);
            // A vanishing derivative means the locator was bogus — the word
            // is beyond repair, not an arithmetic fault.
            let magnitude =
                gf256::div(num, den).map_err(|_| EccError::UncorrectableErrors)?;
            corrected[k] ^= magnitude;
        }

        // Re-check: a word beyond the design distance must not decode to
        // garbage silently.
        if !self.syndromes(&corrected).iter().all(|&s| s == 0) {
            return Err(EccError::UncorrectableErrors);
        }

        corrected.truncate(data_len);
        Ok(corrected)
    }
}

/// Berlekamp–Massey over the syndrome sequence; returns Λ(x) with the
/// trailing zero coefficients trimmed (`Λ[0] == 1`).
fn berlekamp_massey(synd: &[u8]) -> Result<Vec<u8>, EccError> {
    let mut lambda = vec![1u8];
    let mut prev = vec![1u8];
    let mut l = 0usize;
    let mut m = 1usize;
    let mut b = 1u8;

    for r in 0..synd.len() {
        let mut delta = synd[r];
        for j in 1..=l.min(lambda.len() - 1) {
            delta ^= gf256::mul(lambda[j], synd[r - j]);
        }

        if delta == 0 {
            m += 1;
            continue;
        }

        let coef = gf256::div(delta, b)?;
        if 2 * l <= r {
            let keep = lambda.clone();
            if lambda.len() < prev.len() + m {
                lambda.resize(prev.len() + m, 0);
            }
            for (j, &p) in prev.iter().enumerate() {
                lambda[j + m] ^= gf256::mul(coef, p);
            }
            l = r + 1 - l;
            prev = keep;
            b = delta;
            m = 1;
        } else {
            if lambda.len() < prev.len() + m {
                lambda.resize(prev.len() + m, 0);
            }
            for (j, &p) in prev.iter().enumerate() {
                lambda[j + m] ^= gf256::mul(coef, p);
            }
            m += 1;
        }
    }

    while lambda.len() > 1 && *lambda.last().unwrap() == 0 {
        lambda.pop();
    }
    Ok(lambda)
}

/// Product of two polynomials (lowest-degree first), truncated below `xᵖ`.
fn poly_mul_mod(a: &[u8], b: &[u8], p: usize) -> Vec<u8> {
    let mut out = vec![0u8; p];
    for (i, &ai) in a.iter().enumerate() {
        if ai == 0 || i >= p {
            continue;
        }
        for (j, &bj) in b.iter().enumerate() {
            if i + j >= p {
                break;
            }
            out[i + j] ^= gf256::mul(ai, bj);
        }
    }
    while out.len() > 1 && *out.last().unwrap() == 0 {
        out.pop();
    }
    out
}

/// Formal derivative in characteristic 2: only odd-power terms survive.
fn formal_derivative(poly: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; poly.len().saturating_sub(1).max(1)];
    for (k, &c) in poly.iter().enumerate() {
        if k % 2 == 1 {
            out[k - 1] = c;
        }
    }
    while out.len() > 1 && *out.last().unwrap() == 0 {
        out.pop();
    }
    out
}
