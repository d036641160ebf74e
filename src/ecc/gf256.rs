//! GF(2⁸) arithmetic for the Reed–Solomon codec.
//!
//! Field: 256 elements over the primitive polynomial
//! `x⁸ + x⁴ + x³ + x² + 1` (0x11D) with generator α = 2.  Addition is
//! bitwise XOR.  Multiplication and division go through precomputed log
//! and antilog tables; the antilog table is doubled in length so that
//! `exp[log a + log b]` never needs a modular reduction.

use std::sync::OnceLock;

use super::EccError;

/// The primitive polynomial, with the x⁸ term in bit 8.
pub const PRIMITIVE_POLY: u16 = 0x11D;

/// Multiplicative order of α — the field has 255 nonzero elements.
pub const ORDER: usize = 255;

struct Tables {
    /// log[a] = i such that αⁱ = a, for a ≠ 0.  log[0] is unused.
    log: [u8; 256],
    /// exp[i] = αⁱ for i in 0..510 (doubled, no reduction on lookups).
    exp: [u8; 512],
}

static TABLES: OnceLock<Tables> = OnceLock::new();

fn tables() -> &'static Tables {
    TABLES.get_or_init(|| {
        let mut log = [0u8; 256];
        let mut exp = [0u8; 512];
        let mut x: u16 = 1;
        for i in 0..ORDER {
            exp[i] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= PRIMITIVE_POLY;
            }
        }
        for i in ORDER..2 * ORDER {
            exp[i] = exp[i - ORDER];
        }
        Tables { log, exp }
    })
}

/// Field addition (== subtraction): bitwise XOR.
#[inline]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Field multiplication via log/antilog lookup.
#[inline]
pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = tables();
    t.exp[t.log[a as usize] as usize + t.log[b as usize] as usize]
}

/// Field division.  `b == 0` is an arithmetic error.
#[inline]
pub fn div(a: u8, b: u8) -> Result<u8, EccError> {
    if b == 0 {
        return Err(EccError::DivisionByZero);
    }
    if a == 0 {
        return Ok(0);
    }
    let t = tables();
    Ok(t.exp[t.log[a as usize] as usize + ORDER - t.log[b as usize] as usize])
}

/// Multiplicative inverse.  `a == 0` is an arithmetic error.
#[inline]
pub fn inverse(a: u8) -> Result<u8, EccError> {
    if a == 0 {
        return Err(EccError::DivisionByZero);
    }
    let t = tables();
    Ok(t.exp[ORDER - t.log[a as usize] as usize])
}

/// αⁱ for any non-negative exponent.
#[inline]
pub fn alpha_pow(i: usize) -> u8 {
    tables().exp[i % ORDER]
}

/// α⁻ⁱ for any non-negative exponent.
#[inline]
pub fn alpha_pow_neg(i: usize) -> u8 {
    tables().exp[(ORDER - i % ORDER) % ORDER]
}

/// Evaluate a polynomial (coefficients lowest-degree first) at `x`.
pub fn poly_eval_low(coeffs: &[u8], x: u8) -> u8 {
    let mut acc = 0u8;
    for &c in coeffs.iter().rev() {
        acc = mul(acc, x) ^ c;
    }
    acc
}
