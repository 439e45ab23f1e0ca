//! Ordered handler chains with typed bidirectional propagation.
//!
//! A [`Pipeline`] owns an arena of handler slots. Inbound events enter at the
//! front and walk toward the back; outbound operations enter at the back and
//! walk toward the front, finally reaching the [`Transport`]. Handlers added
//! with [`add_front`](Pipeline::add_front) therefore see inbound events first
//! and outbound operations last.
//!
//! ```
//! use bytes::Bytes;
//! use wirechain::{codec::LengthFieldPrepender, pipeline::Pipeline};
//!
//! let mut pipeline: Pipeline<Bytes, Bytes> = Pipeline::new();
//! pipeline.add_back(LengthFieldPrepender::new(2).expect("valid width"));
//! assert_eq!(pipeline.num_handlers(), 1);
//! ```

mod context;
mod endpoint;
mod error;
mod factory;
mod handler;
mod slot;

use std::{
    any::TypeId,
    collections::VecDeque,
    fmt,
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

pub use context::{InboundContext, OutboundContext};
use context::{InboundEvent, PendingOp, Shared, propagate_close, propagate_inbound, propagate_write};
pub use endpoint::{InboundEndpoint, OutboundEndpoint};
pub use error::{PipelineError, Result};
pub use factory::{PipelineFactory, PipelineManager};
pub use handler::{Handler, HandlerDir, PipelineMessage};
use slot::{ErasedHandler, MessageType, Slot};
use tracing::{debug, warn};

use crate::transport::{Transport, WriteFlags};

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(u64);

impl PipelineId {
    fn next() -> Self { Self(NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "PipelineId({})", self.0) }
}

/// Identifier of a handler's slot, unique within its pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ContextId({})", self.0) }
}

/// Read buffer sizing hints for the code feeding the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadBufferSettings {
    /// Spare capacity to guarantee before each read.
    pub min_available: usize,
    /// Size of each fresh allocation.
    pub allocation_size: usize,
}

impl Default for ReadBufferSettings {
    fn default() -> Self {
        Self {
            min_available: 2048,
            allocation_size: 2048,
        }
    }
}

/// An ordered chain of handlers reading `R` and writing `W`.
///
/// Use `()` for a direction the pipeline does not support; the matching
/// [`InboundEndpoint`] or [`OutboundEndpoint`] is then unavailable.
///
/// Dropping a pipeline runs [`finalize`](Self::finalize).
pub struct Pipeline<R, W = ()> {
    slots: Vec<Slot>,
    pending: VecDeque<PendingOp>,
    shared: Shared,
    owner: Option<ContextId>,
    next_context: u64,
    dirty: bool,
    read_buffer: ReadBufferSettings,
    _types: PhantomData<fn(R) -> W>,
}

impl<R, W> Default for Pipeline<R, W> {
    fn default() -> Self { Self::new() }
}

impl<R, W> fmt::Debug for Pipeline<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.shared.id)
            .field("handlers", &self.slots.iter().map(Slot::name).collect::<Vec<_>>())
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl<R, W> Pipeline<R, W> {
    /// Create an empty pipeline with no transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            pending: VecDeque::new(),
            shared: Shared::new(),
            owner: None,
            next_context: 0,
            dirty: true,
            read_buffer: ReadBufferSettings::default(),
            _types: PhantomData,
        }
    }

    /// Create an empty pipeline writing to `transport`.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let mut pipeline = Self::new();
        pipeline.set_transport(transport);
        pipeline
    }

    /// Identifier of this pipeline.
    #[must_use]
    pub fn id(&self) -> PipelineId { self.shared.id }

    /// Append `handler` at the back of the chain.
    pub fn add_back<H: Handler>(&mut self, handler: H) -> &mut Self {
        let slot = self.make_slot(handler);
        self.slots.push(slot);
        self
    }

    /// Insert `handler` at the front of the chain.
    pub fn add_front<H: Handler>(&mut self, handler: H) -> &mut Self {
        let slot = self.make_slot(handler);
        self.slots.insert(0, slot);
        self
    }

    fn make_slot<H: Handler>(&mut self, mut handler: H) -> Slot {
        let id = ContextId(self.next_context);
        self.next_context += 1;
        self.dirty = true;
        handler.attach_pipeline(id);
        debug!(pipeline = %self.shared.id, context = %id, handler = handler.name(), "handler added");
        Slot::new(id, handler)
    }

    /// Remove the unique handler of type `H` and return it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::HandlerNotFound`] when no handler, or more
    /// than one, has type `H`.
    pub fn remove<H: Handler>(&mut self) -> Result<H> {
        let matches: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is::<H>())
            .map(|(index, _)| index)
            .collect();
        let not_found = |matches| PipelineError::HandlerNotFound {
            handler: std::any::type_name::<H>().to_owned(),
            matches,
        };
        let &[index] = matches.as_slice() else {
            return Err(not_found(matches.len()));
        };
        let slot = self.remove_at(index);
        slot.handler
            .into_any()
            .downcast::<H>()
            .map(|handler| *handler)
            .map_err(|_| not_found(0))
    }

    /// Remove the handler installed under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::HandlerNotFound`] if no slot has that id.
    pub fn remove_handler(&mut self, id: ContextId) -> Result<()> {
        let index = self.position(id).ok_or_else(|| PipelineError::HandlerNotFound {
            handler: id.to_string(),
            matches: 0,
        })?;
        self.remove_at(index);
        Ok(())
    }

    /// Remove the front handler.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::HandlerNotFound`] if the chain is empty.
    pub fn remove_front(&mut self) -> Result<()> {
        if self.slots.is_empty() {
            return Err(PipelineError::HandlerNotFound {
                handler: "front".to_owned(),
                matches: 0,
            });
        }
        self.remove_at(0);
        Ok(())
    }

    /// Remove the back handler.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::HandlerNotFound`] if the chain is empty.
    pub fn remove_back(&mut self) -> Result<()> {
        let Some(last) = self.slots.len().checked_sub(1) else {
            return Err(PipelineError::HandlerNotFound {
                handler: "back".to_owned(),
                matches: 0,
            });
        };
        self.remove_at(last);
        Ok(())
    }

    fn remove_at(&mut self, index: usize) -> Slot {
        let mut slot = self.slots.remove(index);
        if self.owner == Some(slot.id) {
            self.owner = None;
        }
        slot.handler.detach(slot.id);
        self.dirty = true;
        debug!(pipeline = %self.shared.id, context = %slot.id, handler = slot.name(), "handler removed");
        slot
    }

    fn position(&self, id: ContextId) -> Option<usize> { self.slots.iter().position(|slot| slot.id == id) }

    /// The `index`-th handler of type `H`, counting from the front.
    #[must_use]
    pub fn get_handler<H: Handler>(&self, index: usize) -> Option<&H> {
        self.slots
            .iter()
            .filter_map(|slot| slot.handler.as_any().downcast_ref::<H>())
            .nth(index)
    }

    /// Mutable access to the `index`-th handler of type `H`.
    pub fn get_handler_mut<H: Handler>(&mut self, index: usize) -> Option<&mut H> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.handler.as_any_mut().downcast_mut::<H>())
            .nth(index)
    }

    /// Slot identifier of the `index`-th handler of type `H`.
    #[must_use]
    pub fn handler_id<H: Handler>(&self, index: usize) -> Option<ContextId> {
        self.slots
            .iter()
            .filter(|slot| slot.is::<H>())
            .nth(index)
            .map(|slot| slot.id)
    }

    /// Mark the first handler of type `H` as the pipeline's owner.
    ///
    /// The owner survives [`finalize`](Self::finalize) and must be released
    /// with [`detach_owner`](Self::detach_owner). Returns `false` when no
    /// handler of type `H` is installed.
    pub fn set_owner<H: Handler>(&mut self) -> bool {
        self.owner = self.handler_id::<H>(0);
        self.owner.is_some()
    }

    /// Detach and remove the owner handler. Returns `false` if there is none.
    pub fn detach_owner(&mut self) -> bool {
        let Some(index) = self.owner.and_then(|id| self.position(id)) else {
            return false;
        };
        self.remove_at(index);
        true
    }

    /// Tear the chain down.
    ///
    /// Every handler except the owner is detached and removed, and queued
    /// outbound operations are discarded. Calling it again is a no-op.
    pub fn finalize(&mut self) {
        self.pending.clear();
        let owner = self.owner;
        let before = self.slots.len();
        self.slots.retain_mut(|slot| {
            if Some(slot.id) == owner {
                return true;
            }
            slot.handler.detach(slot.id);
            false
        });
        if before != self.slots.len() {
            self.dirty = true;
            debug!(pipeline = %self.shared.id, detached = before - self.slots.len(), "pipeline finalized");
        }
    }

    /// Number of installed handlers.
    #[must_use]
    pub fn num_handlers(&self) -> usize { self.slots.len() }

    /// Names of the handlers visited by inbound events, in visiting order.
    #[must_use]
    pub fn inbound_names(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|slot| slot.direction.is_inbound())
            .map(Slot::name)
            .collect()
    }

    /// Names of the handlers visited by outbound operations, in visiting
    /// order.
    #[must_use]
    pub fn outbound_names(&self) -> Vec<&str> {
        self.slots
            .iter()
            .rev()
            .filter(|slot| slot.direction.is_outbound())
            .map(Slot::name)
            .collect()
    }

    /// Attach the transport that receives buffers reaching the front.
    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) {
        self.shared.transport = Some(transport);
    }

    /// The attached transport, if any.
    #[must_use]
    pub fn transport(&self) -> Option<&Arc<dyn Transport>> { self.shared.transport.as_ref() }

    /// Register the manager notified by
    /// [`InboundContext::delete_pipeline`]. Only a weak reference is kept.
    pub fn set_manager(&mut self, manager: &Arc<dyn PipelineManager>) {
        self.shared.manager = Some(Arc::downgrade(manager));
    }

    /// Flags applied to writes reaching the transport.
    #[must_use]
    pub fn write_flags(&self) -> WriteFlags { self.shared.write_flags }

    /// Set the flags applied to writes reaching the transport.
    pub fn set_write_flags(&mut self, flags: WriteFlags) { self.shared.write_flags = flags; }

    /// Read buffer sizing hints.
    #[must_use]
    pub fn read_buffer_settings(&self) -> ReadBufferSettings { self.read_buffer }

    /// Set the read buffer sizing hints.
    pub fn set_read_buffer_settings(&mut self, min_available: usize, allocation_size: usize) {
        self.read_buffer = ReadBufferSettings {
            min_available,
            allocation_size,
        };
    }

    /// Whether handlers have queued outbound operations awaiting
    /// [`flush`](Self::flush).
    #[must_use]
    pub fn has_pending_writes(&self) -> bool { !self.pending.is_empty() }

    /// Run outbound operations queued by handlers during inbound traversal.
    ///
    /// Each operation starts at its issuer's outbound neighbour and they run
    /// in issue order. Operations from handlers removed since they were
    /// queued are discarded.
    ///
    /// # Errors
    ///
    /// Returns the first failing operation's error; later operations stay
    /// queued.
    pub async fn flush(&mut self) -> Result<()> {
        while let Some(op) = self.pending.pop_front() {
            let issuer = op.issuer();
            let Some(index) = self.position(issuer) else {
                warn!(pipeline = %self.shared.id, context = %issuer, "discarding operation from removed handler");
                continue;
            };
            let before = &mut self.slots[..index];
            match op {
                PendingOp::Write { msg, .. } => propagate_write(before, &self.shared, msg).await?,
                PendingOp::Close { .. } => propagate_close(before, &self.shared).await?,
            }
        }
        Ok(())
    }
}

impl<R: 'static, W: 'static> Pipeline<R, W> {
    /// Check that adjacent handlers agree on their message types.
    ///
    /// Runs lazily before the first traversal after a mutation. A direction
    /// whose entry type is `()` is not checked.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TypeMismatch`] naming the first disagreeing
    /// pair.
    pub fn validate(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let unit = TypeId::of::<()>();
        if TypeId::of::<R>() != unit {
            let mut upstream: Option<&Slot> = None;
            for slot in self.slots.iter().filter(|slot| slot.direction.is_inbound()) {
                let expected = upstream.map_or_else(MessageType::of::<R>, |prev| prev.types.rout);
                check(upstream, slot, expected, slot.types.rin)?;
                upstream = Some(slot);
            }
        }
        if TypeId::of::<W>() != unit {
            let mut upstream: Option<&Slot> = None;
            for slot in self.slots.iter().rev().filter(|slot| slot.direction.is_outbound()) {
                let expected = upstream.map_or_else(MessageType::of::<W>, |prev| prev.types.wout);
                check(upstream, slot, expected, slot.types.win)?;
                upstream = Some(slot);
            }
        }
        self.dirty = false;
        Ok(())
    }

    fn fire_inbound(&mut self, event: InboundEvent) -> Result<()> {
        self.validate()?;
        propagate_inbound(&mut self.slots, &mut self.pending, &self.shared, event);
        Ok(())
    }
}

fn check(upstream: Option<&Slot>, downstream: &Slot, expected: MessageType, found: MessageType) -> Result<()> {
    if expected == found {
        return Ok(());
    }
    Err(PipelineError::TypeMismatch {
        upstream: upstream.map_or_else(|| "pipeline".to_owned(), |slot| slot.name().to_owned()),
        downstream: downstream.name().to_owned(),
        expected: expected.name,
        found: found.name,
    })
}

impl<R, W> Drop for Pipeline<R, W> {
    fn drop(&mut self) { self.finalize(); }
}
