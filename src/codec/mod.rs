//! Binary framing codecs installed as pipeline handlers.
//!
//! [`LengthFieldPrepender`] is the canonical outbound handler: it turns each
//! buffer written through the pipeline into `[length][payload]`.

pub mod conversion;
mod error;
mod prepender;

pub use conversion::u64_to_bytes;
pub use error::EncodingError;
pub use prepender::{LengthFieldPrepender, LengthFieldPrependerBuilder};

/// Byte order used when writing length fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Endianness {
    /// Most significant byte first (network order).
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}
