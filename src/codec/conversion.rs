//! Conversion helpers for fixed-width length fields.

use super::{EncodingError, Endianness};

/// Widest length field supported, in bytes.
pub const MAX_FIELD_LENGTH: usize = 8;

/// Largest value representable in `field_length` bytes.
///
/// # Errors
///
/// Returns [`EncodingError::InvalidFieldLength`] if `field_length` is not in
/// `1..=8`.
pub fn max_field_value(field_length: usize) -> Result<u64, EncodingError> {
    match field_length {
        MAX_FIELD_LENGTH => Ok(u64::MAX),
        1..MAX_FIELD_LENGTH => Ok((1u64 << (8 * field_length)) - 1),
        other => Err(EncodingError::InvalidFieldLength(other)),
    }
}

/// Encodes `value` into the first `field_length` bytes of `out`.
///
/// Bytes of `out` past `field_length` are zeroed. Returns the number of bytes
/// written.
///
/// # Errors
///
/// Returns [`EncodingError::InvalidFieldLength`] for unsupported widths and
/// [`EncodingError::LengthOverflow`] when `value` does not fit.
#[must_use = "length field byte count must be used"]
pub fn u64_to_bytes(
    value: u64,
    field_length: usize,
    endianness: Endianness,
    out: &mut [u8; MAX_FIELD_LENGTH],
) -> Result<usize, EncodingError> {
    if value > max_field_value(field_length)? {
        return Err(EncodingError::LengthOverflow {
            length: i128::from(value),
            field_length,
        });
    }

    match endianness {
        Endianness::Big => {
            let bytes = value.to_be_bytes();
            out[..field_length].copy_from_slice(&bytes[MAX_FIELD_LENGTH - field_length..]);
        }
        Endianness::Little => {
            let bytes = value.to_le_bytes();
            out[..field_length].copy_from_slice(&bytes[..field_length]);
        }
    }
    out[field_length..].fill(0);

    Ok(field_length)
}
