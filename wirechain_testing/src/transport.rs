//! In-memory [`Transport`] recording everything handed to it.

use std::{
    io,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use wirechain::transport::{Transport, WriteFlags};

/// Transport that stores each write instead of sending it.
///
/// Writes can be made to fail with [`fail_writes`](Self::fail_writes) to
/// exercise error propagation.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    writes: Mutex<Vec<(Bytes, WriteFlags)>>,
    closes: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingTransport {
    /// Every buffer written, in order, with its flags.
    pub fn writes(&self) -> Vec<(Bytes, WriteFlags)> { self.writes.lock().expect("writes lock").clone() }

    /// Every buffer written, in order.
    pub fn buffers(&self) -> Vec<Bytes> { self.writes().into_iter().map(|(buf, _)| buf).collect() }

    /// All written bytes concatenated.
    pub fn written(&self) -> Vec<u8> { self.buffers().concat() }

    /// Number of times [`Transport::close`] was called.
    pub fn close_count(&self) -> usize { self.closes.load(Ordering::SeqCst) }

    /// Make subsequent writes fail with [`io::ErrorKind::BrokenPipe`].
    pub fn fail_writes(&self, fail: bool) { self.failing.store(fail, Ordering::SeqCst); }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn write(&self, buf: Bytes, flags: WriteFlags) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "recording transport failed"));
        }
        self.writes.lock().expect("writes lock").push((buf, flags));
        Ok(())
    }

    async fn close(&self) -> io::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
