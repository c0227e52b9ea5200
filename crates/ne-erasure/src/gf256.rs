//! `GF(2^8)` arithmetic: log/antilog tables built from the same primitive
//! polynomial (`0x11d`, generator `2`) Reed-Solomon implementations conventionally
//! use. Everything above this module works purely in terms of [`mul`]/[`div`]/[`inv`]
//! and never touches the tables directly.

use std::sync::LazyLock;

const PRIMITIVE_POLY: u16 = 0x11d;

struct Tables {
    /// `exp[i] = generator^i`, extended to `2*255` entries so `exp[log_a + log_b]`
    /// never needs a modulo reduction in the hot path.
    exp: [u8; 512],
    /// `log[a] = i` such that `generator^i == a`, for `a != 0`.
    log: [u8; 256],
}

fn build_tables() -> Tables {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];
    let mut x: u16 = 1;
    for i in 0..255usize {
        exp[i] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= PRIMITIVE_POLY;
        }
    }
    for i in 255..512 {
        exp[i] = exp[i - 255];
    }
    Tables { exp, log }
}

static TABLES: LazyLock<Tables> = LazyLock::new(build_tables);

/// Multiplies two `GF(2^8)` elements.
#[must_use]
pub fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = &*TABLES;
    let la = t.log[a as usize] as usize;
    let lb = t.log[b as usize] as usize;
    t.exp[la + lb]
}

/// Multiplicative inverse of `a`; `a` must be non-zero.
#[must_use]
pub fn inv(a: u8) -> u8 {
    assert!(a != 0, "zero has no multiplicative inverse in GF(2^8)");
    let t = &*TABLES;
    let la = t.log[a as usize] as usize;
    t.exp[255 - la]
}

/// Divides `a` by `b`; `b` must be non-zero.
#[must_use]
pub fn div(a: u8, b: u8) -> u8 {
    if a == 0 {
        return 0;
    }
    mul(a, inv(b))
}

/// Addition (and subtraction) in `GF(2^8)` is XOR.
#[must_use]
pub fn add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Builds a 256-entry multiplication-by-`coefficient` lookup table, the unit
/// `ne_erasure` precomputes per matrix coefficient.
#[must_use]
pub fn mul_table(coefficient: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    for (value, slot) in table.iter_mut().enumerate() {
        *slot = mul(coefficient, value as u8);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_absorbing() {
        for a in 0..=255u8 {
            assert_eq!(mul(a, 0), 0);
            assert_eq!(mul(0, a), 0);
        }
    }

    #[test]
    fn one_is_identity() {
        for a in 0..=255u8 {
            assert_eq!(mul(a, 1), a);
        }
    }

    #[test]
    fn inverse_round_trips() {
        for a in 1..=255u8 {
            assert_eq!(mul(a, inv(a)), 1, "a={a}");
        }
    }

    #[test]
    fn div_undoes_mul() {
        for a in 1..=255u8 {
            for b in 1..=255u8 {
                assert_eq!(div(mul(a, b), b), a);
            }
        }
    }

    #[test]
    fn multiplication_is_commutative_and_distributive_over_xor() {
        for a in [2u8, 17, 200] {
            for b in [3u8, 19, 250] {
                assert_eq!(mul(a, b), mul(b, a));
            }
        }
        let (a, b, c) = (5u8, 9u8, 13u8);
        assert_eq!(mul(a, add(b, c)), add(mul(a, b), mul(a, c)));
    }

    #[test]
    fn mul_table_matches_scalar_mul() {
        let table = mul_table(37);
        for v in 0..=255u8 {
            assert_eq!(table[v as usize], mul(37, v));
        }
    }
}
