//! Low-level integer helpers: byte folding, two's complement and bit masks.
//!
//! Byte slices handed to these functions are most-significant byte first.

/// Mask covering the low `bits` bits.
pub fn mask(bits: usize) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Sign-extends the low `bits` of `value` to a full `i64`.
pub fn sign_extend(value: u64, bits: usize) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Folds big-endian bytes into an unsigned value. Only the low 8 bytes are kept.
pub fn fold_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

/// Two's complement representation of `value` in `width` bytes, most-significant first.
pub fn twos_complement_bytes(value: i64, width: usize) -> Vec<u8> {
    let fill = if value < 0 { 0xff } else { 0x00 };
    let be = value.to_be_bytes();
    let mut out = vec![fill; width.saturating_sub(be.len())];
    out.extend_from_slice(&be[be.len().saturating_sub(width)..]);
    out
}

/// Byte at `weight` (0 = least significant) of `value`; zero beyond the eighth byte.
pub fn byte_at(value: u64, weight: usize) -> u8 {
    if weight < 8 { (value >> (weight * 8)) as u8 } else { 0 }
}

/// `value >> shift`, zero when the shift is 64 or more.
pub fn shr(value: u64, shift: usize) -> u64 {
    u32::try_from(shift)
        .ok()
        .and_then(|s| value.checked_shr(s))
        .unwrap_or(0)
}

/// `value << shift`, zero when the shift is 64 or more.
pub fn shl(value: u64, shift: usize) -> u64 {
    u32::try_from(shift)
        .ok()
        .and_then(|s| value.checked_shl(s))
        .unwrap_or(0)
}
