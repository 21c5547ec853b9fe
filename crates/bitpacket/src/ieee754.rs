//! IEEE 754 conversion between floats and their byte images.
//!
//! All byte images are most-significant byte first. Callers reorder bytes for
//! little-endian fields before and after the call.

/// Decodes a single-precision float. Missing trailing bytes read as zero.
pub fn decode_single(bytes: &[u8]) -> f32 {
    let mut buf = [0u8; 4];
    for (dst, src) in buf.iter_mut().zip(bytes) {
        *dst = *src;
    }
    f32::from_be_bytes(buf)
}

/// Decodes a double-precision float. Missing trailing bytes read as zero.
pub fn decode_double(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    for (dst, src) in buf.iter_mut().zip(bytes) {
        *dst = *src;
    }
    f64::from_be_bytes(buf)
}

pub fn encode_single(value: f32) -> [u8; 4] {
    value.to_be_bytes()
}

pub fn encode_double(value: f64) -> [u8; 8] {
    value.to_be_bytes()
}
