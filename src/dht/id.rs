#![warn(missing_docs)]
//! Identifier arithmetic on the ring.
//!
//! Identifiers are big-endian byte buffers interpreted as unsigned
//! integers modulo 2^m, where m is the bit width of the configured
//! hash function. All the ordering predicates here are wrap-aware:
//! an interval whose start is numerically larger than its end crosses
//! the zero point of the ring. Buffers shorter than m/8 bytes are
//! treated as having implicit leading zero bytes.

use num_bigint::BigUint;

fn big(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_be(bytes)
}

/// The ring size 2^bits.
fn modulus(bits: usize) -> BigUint {
    BigUint::from(1u8) << bits
}

/// Test whether `key` lies strictly between `a` and `b` going
/// clockwise around the ring. Both endpoints are exclusive.
pub fn between(a: &[u8], b: &[u8], key: &[u8]) -> bool {
    let (a, b, key) = (big(a), big(b), big(key));

    // Interval crossing the zero point.
    if a >= b {
        return key > a || key < b;
    }

    a < key && key < b
}

/// Same as [between] with `key == b` permitted.
pub fn between_right_incl(a: &[u8], b: &[u8], key: &[u8]) -> bool {
    let (a, b, key) = (big(a), big(b), big(key));

    if a >= b {
        return key > a || key <= b;
    }

    a < key && key <= b
}

/// Compute (id + 2^exp) mod 2^bits as a fresh bits-wide identifier.
pub fn power_offset(id: &[u8], exp: usize, bits: usize) -> Vec<u8> {
    let sum = (big(id) + (BigUint::from(1u8) << exp)) % modulus(bits);
    let raw = sum.to_bytes_be();

    // Left-pad back to the fixed identifier width.
    let width = (bits + 7) / 8;
    let mut out = vec![0u8; width.saturating_sub(raw.len())];
    out.extend_from_slice(&raw);
    out
}

/// Forward distance from `a` to `b` modulo 2^bits, in [0, 2^bits).
pub fn distance(a: &[u8], b: &[u8], bits: usize) -> BigUint {
    let ring = modulus(bits);
    let a = big(a) % &ring;
    let b = big(b) % &ring;

    if b >= a {
        b - a
    } else {
        ring - a + b
    }
}
