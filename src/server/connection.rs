//! Per-connection tasks for [`PipelineServer`](super::PipelineServer).
//!
//! Each accepted stream is split: the write half becomes the pipeline's
//! transport and the read half feeds the front of the pipeline. The task
//! reports activity to the manager task so idle timeouts and draining see
//! an accurate picture.

use std::{
    any::Any,
    fmt,
    net::SocketAddr,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::{
    io::AsyncReadExt,
    net::{TcpStream, tcp::OwnedReadHalf},
    select,
    time::Instant,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::manager_task::ManagerHandle;
use crate::{
    connection_manager::{ConnectionKey, ManagedConnection},
    pipeline::{InboundEndpoint, Pipeline, PipelineError, PipelineFactory, PipelineId, PipelineManager},
    transport::{StreamTransport, Transport},
};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to an accepted connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl ConnectionId {
    /// Create a new [`ConnectionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Allocate the next process-wide identifier.
    #[must_use]
    pub fn next() -> Self { Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ConnectionId({})", self.0) }
}

/// Shared state of a live connection, seen by both its task and the
/// connection manager.
///
/// Implements [`ManagedConnection`] for the manager and
/// [`PipelineManager`] so handlers can ask for the connection to be torn
/// down.
pub struct ConnectionHandle {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    opened: Instant,
    busy: AtomicBool,
    close_requested: AtomicBool,
    shutdown_pending: AtomicBool,
    last_active_ms: AtomicU64,
    token: CancellationToken,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("busy", &self.is_busy())
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    /// Create the handle for a freshly accepted connection.
    #[must_use]
    pub fn new(id: ConnectionId, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            peer_addr,
            opened: Instant::now(),
            busy: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
            shutdown_pending: AtomicBool::new(false),
            last_active_ms: AtomicU64::new(0),
            token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.peer_addr }

    /// Whether the connection was asked to close once idle.
    #[must_use]
    pub fn is_closing(&self) -> bool { self.close_requested.load(Ordering::Acquire) }

    /// Whether the connection was warned of a pending shutdown.
    #[must_use]
    pub fn is_shutdown_pending(&self) -> bool { self.shutdown_pending.load(Ordering::Acquire) }

    /// Whether the connection task has been told to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool { self.token.is_cancelled() }

    /// Resolves once the connection task has been told to stop.
    pub async fn cancelled(&self) { self.token.cancelled().await; }

    pub(crate) fn begin_activity(&self) { self.busy.store(true, Ordering::Release); }

    pub(crate) fn end_activity(&self) {
        self.touch();
        self.busy.store(false, Ordering::Release);
    }

    fn touch(&self) {
        let elapsed = u64::try_from(self.opened.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_active_ms.store(elapsed, Ordering::Release);
    }
}

impl ManagedConnection for ConnectionHandle {
    fn is_busy(&self) -> bool { self.busy.load(Ordering::Acquire) }

    fn idle_time(&self) -> Duration {
        if self.is_busy() {
            return Duration::ZERO;
        }
        let last_active = Duration::from_millis(self.last_active_ms.load(Ordering::Acquire));
        self.opened.elapsed().saturating_sub(last_active)
    }

    fn close_when_idle(&self) {
        self.close_requested.store(true, Ordering::Release);
        if !self.is_busy() {
            self.token.cancel();
        }
    }

    fn notify_pending_shutdown(&self) {
        debug!("pending shutdown: id={}", self.id);
        self.shutdown_pending.store(true, Ordering::Release);
    }

    fn drop_connection(&self) { self.token.cancel(); }

    fn timeout_expired(&self) {
        debug!("idle timeout: id={}, peer_addr={:?}", self.id, self.peer_addr);
        self.token.cancel();
    }

    fn dump_connection_state(&self, verbosity: u8) {
        info!(
            "connection state: id={}, peer_addr={:?}, busy={}, idle={:?}, closing={}, verbosity={verbosity}",
            self.id,
            self.peer_addr,
            self.is_busy(),
            self.idle_time(),
            self.is_closing(),
        );
    }
}

impl PipelineManager for ConnectionHandle {
    fn delete_pipeline(&self, id: PipelineId) {
        debug!("pipeline {id} deleted by a handler: id={}", self.id);
        self.token.cancel();
    }

    fn refresh_timeout(&self, _id: PipelineId) { self.touch(); }
}

/// Spawn a task to process a single TCP connection, logging and discarding
/// any panics.
pub(super) fn spawn_connection_task<F, W>(
    stream: TcpStream,
    factory: Arc<F>,
    manager: ManagerHandle,
    tracker: &TaskTracker,
) where
    F: PipelineFactory<Bytes, W> + 'static,
    W: Send + 'static,
{
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("failed to retrieve peer address: error={e}");
            None
        }
    };
    tracker.spawn(async move {
        let fut = AssertUnwindSafe(process_stream(stream, peer_addr, factory, manager)).catch_unwind();
        if let Err(panic) = fut.await {
            crate::metrics::inc_errors();
            error!(
                "connection task panicked: panic={}, peer_addr={peer_addr:?}",
                panic_message(panic.as_ref())
            );
        }
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&'static str>().copied())
        .unwrap_or("<non-string panic payload>")
}

async fn process_stream<F, W>(
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    factory: Arc<F>,
    manager: ManagerHandle,
) where
    F: PipelineFactory<Bytes, W> + 'static,
    W: Send + 'static,
{
    let (mut reader, writer) = stream.into_split();
    let transport: Arc<dyn Transport> = Arc::new(StreamTransport::new(writer));
    let mut pipeline = factory.new_pipeline(Arc::clone(&transport));
    let handle = Arc::new(ConnectionHandle::new(ConnectionId::next(), peer_addr));
    let pipeline_manager: Arc<dyn PipelineManager> = handle.clone();
    pipeline.set_manager(&pipeline_manager);

    let Some(key) = manager.add(Arc::clone(&handle)).await else {
        debug!("connection manager stopped; closing connection: peer_addr={peer_addr:?}");
        return;
    };
    debug!("connection opened: id={}, key={key}, peer_addr={peer_addr:?}", handle.id());

    if let Err(e) = drive_pipeline(&mut pipeline, &mut reader, &handle, &manager, key).await {
        crate::metrics::inc_errors();
        warn!("pipeline error: id={}, error={e}", handle.id());
    }
    if let Err(e) = finish_pipeline(&mut pipeline).await {
        debug!("pipeline teardown error: id={}, error={e}", handle.id());
    }
    if let Err(e) = transport.close().await {
        debug!("transport close failed: id={}, error={e}", handle.id());
    }
    manager.remove(key);
    debug!("connection closed: id={}", handle.id());
}

/// Feed socket reads into `pipeline` until the peer hangs up or the
/// connection is told to stop.
async fn drive_pipeline<W>(
    pipeline: &mut Pipeline<Bytes, W>,
    reader: &mut OwnedReadHalf,
    handle: &ConnectionHandle,
    manager: &ManagerHandle,
    key: ConnectionKey,
) -> Result<(), PipelineError>
where
    W: Send + 'static,
{
    pipeline.transport_active()?;
    pipeline.flush().await?;

    let mut buf = BytesMut::new();
    loop {
        let settings = pipeline.read_buffer_settings();
        if buf.capacity() - buf.len() < settings.min_available {
            buf.reserve(settings.allocation_size);
        }
        let read = select! {
            biased;

            () = handle.cancelled() => return Ok(()),
            read = reader.read_buf(&mut buf) => read,
        };
        match read {
            Ok(0) => {
                pipeline.read_eof()?;
                return pipeline.flush().await;
            }
            Ok(_) => {
                handle.begin_activity();
                manager.activated(key);
                let delivered = deliver(pipeline, buf.split().freeze()).await;
                handle.end_activity();
                manager.deactivated(key);
                delivered?;
                if handle.is_closing() {
                    return Ok(());
                }
            }
            Err(e) => {
                pipeline.read_exception(PipelineError::Transport(e))?;
                return pipeline.flush().await;
            }
        }
    }
}

async fn deliver<W: Send + 'static>(pipeline: &mut Pipeline<Bytes, W>, bytes: Bytes) -> Result<(), PipelineError> {
    pipeline.read(bytes)?;
    pipeline.flush().await
}

async fn finish_pipeline<W: Send + 'static>(pipeline: &mut Pipeline<Bytes, W>) -> Result<(), PipelineError> {
    pipeline.transport_inactive()?;
    pipeline.flush().await
}
