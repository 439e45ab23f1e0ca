//! Outbound handler prefixing each buffer with its length.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use super::{
    EncodingError,
    Endianness,
    conversion::{MAX_FIELD_LENGTH, max_field_value, u64_to_bytes},
};
use crate::pipeline::{Handler, HandlerDir, OutboundContext, PipelineError};

/// An encoder that prepends the length of each outbound buffer.
///
/// `LengthFieldPrepender::new(2)` encodes the twelve byte payload
/// `"HELLO, WORLD"` as:
///
/// ```text
/// +--------+----------------+
/// | 0x000C | "HELLO, WORLD" |
/// +--------+----------------+
/// ```
///
/// With [`length_includes_length_field`](LengthFieldPrependerBuilder::length_includes_length_field)
/// enabled the field also counts its own two bytes, giving `0x000E`.
///
/// The configuration is fixed at construction; each write is an independent
/// transform.
///
/// # Examples
///
/// ```
/// use wirechain::codec::LengthFieldPrepender;
///
/// let prepender = LengthFieldPrepender::new(2).expect("valid width");
/// let framed = prepender.encode(b"HELLO, WORLD").expect("encode");
/// assert_eq!(&framed[..2], &[0x00, 0x0C]);
/// assert_eq!(&framed[2..], b"HELLO, WORLD");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LengthFieldPrepender {
    field_length: usize,
    adjustment: i64,
    includes_field: bool,
    endianness: Endianness,
}

impl LengthFieldPrepender {
    /// Create a prepender with a `field_length`-byte big-endian field and no
    /// adjustment.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::InvalidFieldLength`] if `field_length` is not
    /// in `1..=8`.
    pub fn new(field_length: usize) -> Result<Self, EncodingError> {
        Self::builder().field_length(field_length).build()
    }

    /// Start configuring a prepender.
    #[must_use]
    pub fn builder() -> LengthFieldPrependerBuilder { LengthFieldPrependerBuilder::default() }

    /// Width of the length field in bytes.
    #[must_use]
    pub const fn field_length(&self) -> usize { self.field_length }

    /// Signed value added to every computed length.
    #[must_use]
    pub const fn adjustment(&self) -> i64 { self.adjustment }

    /// Whether the emitted length counts the length field itself.
    #[must_use]
    pub const fn length_includes_length_field(&self) -> bool { self.includes_field }

    /// Byte order of the length field.
    #[must_use]
    pub const fn endianness(&self) -> Endianness { self.endianness }

    /// Compute the value written into the length field for a payload of
    /// `payload_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::NegativeLength`] or
    /// [`EncodingError::LengthOverflow`] when the adjusted length cannot be
    /// represented by the field.
    pub fn frame_length(&self, payload_len: usize) -> Result<u64, EncodingError> {
        let mut length = i128::try_from(payload_len).unwrap_or(i128::MAX) + i128::from(self.adjustment);
        if self.includes_field {
            length += i128::try_from(self.field_length).unwrap_or(i128::MAX);
        }
        if length < 0 {
            return Err(EncodingError::NegativeLength { length });
        }
        let max = max_field_value(self.field_length)?;
        match u64::try_from(length) {
            Ok(value) if value <= max => Ok(value),
            _ => Err(EncodingError::LengthOverflow {
                length,
                field_length: self.field_length,
            }),
        }
    }

    /// Encode `payload` as `[length][payload]`.
    ///
    /// # Errors
    ///
    /// Returns an [`EncodingError`] if the length cannot be represented; no
    /// bytes are produced in that case.
    pub fn encode(&self, payload: &[u8]) -> Result<Bytes, EncodingError> {
        let length = self.frame_length(payload.len())?;
        let mut field = [0u8; MAX_FIELD_LENGTH];
        let written = u64_to_bytes(length, self.field_length, self.endianness, &mut field)?;

        let mut out = BytesMut::with_capacity(written + payload.len());
        out.put_slice(&field[..written]);
        out.put_slice(payload);
        Ok(out.freeze())
    }
}

impl Default for LengthFieldPrepender {
    fn default() -> Self {
        Self {
            field_length: 4,
            adjustment: 0,
            includes_field: false,
            endianness: Endianness::Big,
        }
    }
}

#[async_trait]
impl Handler for LengthFieldPrepender {
    type Rin = Bytes;
    type Rout = Bytes;
    type Win = Bytes;
    type Wout = Bytes;

    const DIRECTION: HandlerDir = HandlerDir::Out;

    fn name(&self) -> &str { "LengthFieldPrepender" }

    async fn write(
        &mut self,
        ctx: &mut OutboundContext<'_, Bytes>,
        msg: Bytes,
    ) -> Result<(), PipelineError> {
        let framed = self.encode(&msg).inspect_err(|error| {
            debug!(%error, payload_len = msg.len(), "length field encoding failed");
            crate::metrics::inc_errors();
        })?;
        ctx.fire_write(framed).await
    }
}

/// Builder for [`LengthFieldPrepender`].
///
/// Defaults mirror the common network framing: a four byte, big-endian
/// field with no adjustment that excludes itself from the count.
#[derive(Clone, Copy, Debug)]
pub struct LengthFieldPrependerBuilder {
    inner: LengthFieldPrepender,
}

impl Default for LengthFieldPrependerBuilder {
    fn default() -> Self {
        Self {
            inner: LengthFieldPrepender::default(),
        }
    }
}

impl LengthFieldPrependerBuilder {
    /// Set the width of the length field in bytes.
    #[must_use]
    pub fn field_length(mut self, bytes: usize) -> Self {
        self.inner.field_length = bytes;
        self
    }

    /// Set the signed adjustment added to every computed length.
    #[must_use]
    pub fn adjustment(mut self, adjustment: i64) -> Self {
        self.inner.adjustment = adjustment;
        self
    }

    /// Count the length field itself in the emitted length.
    #[must_use]
    pub fn length_includes_length_field(mut self, include: bool) -> Self {
        self.inner.includes_field = include;
        self
    }

    /// Set the byte order of the length field.
    #[must_use]
    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.inner.endianness = endianness;
        self
    }

    /// Validate the configuration and build the prepender.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingError::InvalidFieldLength`] if the field width is not
    /// in `1..=8`.
    pub fn build(self) -> Result<LengthFieldPrepender, EncodingError> {
        max_field_value(self.inner.field_length)?;
        Ok(self.inner)
    }
}
