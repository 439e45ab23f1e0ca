//! Sending a slice of a file through a [`Transport`] without staging the
//! whole slice in memory.

use std::{fmt, io, io::SeekFrom};

use bytes::BytesMut;
use log::trace;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
    sync::Mutex,
};

use crate::transport::{Transport, WriteFlags};

/// Largest buffer handed to the transport in one write.
pub const TRANSFER_CHUNK: usize = 64 * 1024;

/// `count` bytes of a file starting at `offset`.
///
/// A region can be transferred any number of times, including concurrently.
/// Transfers take turns on the file so the chunks of one transfer reach the
/// transport back to back.
pub struct FileRegion {
    file: Mutex<File>,
    offset: u64,
    count: u64,
}

impl FileRegion {
    /// Region of `count` bytes of `file` beginning at `offset`.
    #[must_use]
    pub fn new(file: File, offset: u64, count: u64) -> Self {
        Self {
            file: Mutex::new(file),
            offset,
            count,
        }
    }

    /// Byte offset of the region within the file.
    #[must_use]
    pub fn offset(&self) -> u64 { self.offset }

    /// Length of the region in bytes.
    #[must_use]
    pub fn count(&self) -> u64 { self.count }

    /// Write the region to `transport` in chunks of at most
    /// [`TRANSFER_CHUNK`] bytes.
    ///
    /// Every chunk but the last is written with [`WriteFlags::CORK`].
    ///
    /// # Errors
    ///
    /// Returns any error from reading the file or writing to the transport,
    /// and [`io::ErrorKind::UnexpectedEof`] if the file ends inside the
    /// region.
    pub async fn transfer_to(&self, transport: &dyn Transport) -> io::Result<()> {
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(self.offset)).await?;

        let mut remaining = self.count;
        while remaining > 0 {
            let want = usize::try_from(remaining).map_or(TRANSFER_CHUNK, |left| left.min(TRANSFER_CHUNK));
            let mut chunk = BytesMut::zeroed(want);
            let read = file.read(&mut chunk).await?;
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file ended {remaining} bytes short of the region"),
                ));
            }
            chunk.truncate(read);
            remaining -= read as u64;

            let flags = if remaining > 0 { WriteFlags::CORK } else { WriteFlags::NONE };
            transport.write(chunk.freeze(), flags).await?;
        }

        trace!(
            "file region transferred: offset={}, count={}",
            self.offset, self.count
        );
        Ok(())
    }
}

impl fmt::Debug for FileRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRegion")
            .field("offset", &self.offset)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}
