//! # Codec — wire-format primitives
//!
//! The shared encoding vocabulary for the batch format: little-endian
//! fixed-width integers, base-128 varint32, and varint-length-prefixed byte
//! strings.
//!
//! Encoders append to a `Vec<u8>` (or write into a fixed slot) and cannot
//! fail. Decoders operate on a `&mut &[u8]` cursor that is advanced past
//! consumed bytes; any malformed input yields a [`CodecError`] and leaves the
//! cursor position unspecified.
//!
//! ## Varint32
//!
//! ```text
//! 7 data bits per byte, least-significant group first,
//! high bit set = continuation. 1-5 bytes per value.
//! ```
//!
//! ## Example
//!
//! ```rust
//! let mut buf = Vec::new();
//! codec::put_varint32(&mut buf, 300);
//! codec::put_length_prefixed(&mut buf, b"hello");
//!
//! let mut input = buf.as_slice();
//! assert_eq!(codec::get_varint32(&mut input).unwrap(), 300);
//! assert_eq!(codec::get_length_prefixed(&mut input).unwrap(), b"hello");
//! assert!(input.is_empty());
//! ```

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Maximum encoded size of a varint32 in bytes.
pub const MAX_VARINT32_BYTES: usize = 5;

/// Errors produced by the decoding half of the codec.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended in the middle of a varint32.
    #[error("truncated varint32")]
    TruncatedVarint,

    /// A varint32 encoded a value wider than 32 bits.
    #[error("varint32 overflow")]
    VarintOverflow,

    /// A length prefix pointed past the end of the input.
    #[error("length prefix past end of input")]
    TruncatedSlice,
}

/// Writes `value` as a little-endian u32 into `dst[..4]`.
///
/// # Panics
///
/// Panics if `dst` is shorter than 4 bytes.
pub fn encode_fixed32(dst: &mut [u8], value: u32) {
    LittleEndian::write_u32(dst, value);
}

/// Reads a little-endian u32 from `src[..4]`.
///
/// # Panics
///
/// Panics if `src` is shorter than 4 bytes.
pub fn decode_fixed32(src: &[u8]) -> u32 {
    LittleEndian::read_u32(src)
}

/// Writes `value` as a little-endian u64 into `dst[..8]`.
///
/// # Panics
///
/// Panics if `dst` is shorter than 8 bytes.
pub fn encode_fixed64(dst: &mut [u8], value: u64) {
    LittleEndian::write_u64(dst, value);
}

/// Reads a little-endian u64 from `src[..8]`.
///
/// # Panics
///
/// Panics if `src` is shorter than 8 bytes.
pub fn decode_fixed64(src: &[u8]) -> u64 {
    LittleEndian::read_u64(src)
}

/// Appends `value` to `dst` in base-128 varint form (1-5 bytes).
pub fn put_varint32(dst: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        dst.push(value as u8 | 0x80);
        value >>= 7;
    }
    dst.push(value as u8);
}

/// Reads a varint32 from the front of `input`, advancing the cursor past it.
///
/// Fails with [`CodecError::TruncatedVarint`] if the input ends mid-varint
/// and [`CodecError::VarintOverflow`] if the decoded value does not fit in
/// 32 bits.
pub fn get_varint32(input: &mut &[u8]) -> Result<u32, CodecError> {
    let mut result = 0u32;
    for idx in 0..MAX_VARINT32_BYTES {
        let byte = *input.get(idx).ok_or(CodecError::TruncatedVarint)?;
        let shift = 7 * idx as u32;
        let group = u32::from(byte & 0x7F);
        // The fifth byte may only carry the remaining 4 bits of a u32.
        if shift == 28 && group > 0x0F {
            return Err(CodecError::VarintOverflow);
        }
        result |= group << shift;
        if byte & 0x80 == 0 {
            *input = &input[idx + 1..];
            return Ok(result);
        }
    }
    // Continuation bit still set after five bytes.
    Err(CodecError::VarintOverflow)
}

/// Appends `value` as a varint32 length followed by the raw bytes.
///
/// A zero-length `value` encodes as a single `0x00` length byte.
pub fn put_length_prefixed(dst: &mut Vec<u8>, value: &[u8]) {
    put_varint32(dst, value.len() as u32);
    dst.extend_from_slice(value);
}

/// Appends several chunks as one length-prefixed value.
///
/// The encoded length is the sum of the chunk lengths, so the result is
/// byte-identical to concatenating the chunks first. Lets callers avoid an
/// intermediate allocation when a logical value is already split.
pub fn put_length_prefixed_parts(dst: &mut Vec<u8>, parts: &[&[u8]]) {
    let total: usize = parts.iter().map(|part| part.len()).sum();
    put_varint32(dst, total as u32);
    for part in parts {
        dst.extend_from_slice(part);
    }
}

/// Reads a length-prefixed byte string from the front of `input`, advancing
/// the cursor past it. The returned slice borrows from the input.
pub fn get_length_prefixed<'a>(input: &mut &'a [u8]) -> Result<&'a [u8], CodecError> {
    let len = get_varint32(input)? as usize;
    if input.len() < len {
        return Err(CodecError::TruncatedSlice);
    }
    let (value, rest) = input.split_at(len);
    *input = rest;
    Ok(value)
}
