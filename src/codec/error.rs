//! Error types for the framing codecs.
//!
//! Encoding failures are surfaced synchronously to the caller and the payload
//! is never forwarded when one occurs.

use thiserror::Error;

/// Errors raised while computing or writing a length field.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodingError {
    /// The adjusted length came out below zero.
    #[error("computed frame length {length} is negative")]
    NegativeLength {
        /// Length after applying the configured adjustment.
        length: i128,
    },

    /// The adjusted length does not fit in the configured field width.
    #[error("frame length {length} does not fit in a {field_length}-byte length field")]
    LengthOverflow {
        /// Length after applying the configured adjustment.
        length: i128,
        /// Width of the length field in bytes.
        field_length: usize,
    },

    /// The configured field width is outside `1..=8`.
    #[error("unsupported length field width {0}; expected 1..=8 bytes")]
    InvalidFieldLength(usize),
}
