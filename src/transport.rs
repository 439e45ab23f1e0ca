//! Byte transports sitting past the front of a pipeline.
//!
//! A pipeline only needs something that accepts a buffer and completes
//! asynchronously; [`StreamTransport`] adapts any tokio writer to that shape.

use std::{fmt, io, ops::BitOr};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

/// Per-write hints passed down to the transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct WriteFlags(u8);

impl WriteFlags {
    /// No special handling.
    pub const NONE: Self = Self(0);
    /// More data follows; the transport may hold the buffer instead of
    /// flushing it immediately.
    pub const CORK: Self = Self(1);

    /// Whether every flag in `other` is set on `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }
}

impl BitOr for WriteFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

/// Sink for outbound bytes produced by a pipeline.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write `buf`, completing once the transport has accepted it.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised by the underlying writer.
    async fn write(&self, buf: Bytes, flags: WriteFlags) -> io::Result<()>;

    /// Close the write side of the transport.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while shutting the writer down.
    async fn close(&self) -> io::Result<()>;
}

/// [`Transport`] over a tokio writer such as the write half of a
/// `TcpStream`.
pub struct StreamTransport<W> {
    writer: Mutex<W>,
}

impl<W> StreamTransport<W> {
    /// Wrap `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W { self.writer.into_inner() }
}

impl<W> fmt::Debug for StreamTransport<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl<W> Transport for StreamTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&self, buf: Bytes, flags: WriteFlags) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await?;
        if !flags.contains(WriteFlags::CORK) {
            writer.flush().await?;
        }
        Ok(())
    }

    async fn close(&self) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await
    }
}
