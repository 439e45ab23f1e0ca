//! Handler contexts and chain traversal.
//!
//! A context never points back at its pipeline. Instead it borrows the
//! portion of the slot arena that lies ahead of its handler in the current
//! direction: the slots behind it for inbound events and the slots in front
//! of it for outbound operations. Forwarding splits that borrow again, so
//! traversal is a chain of reborrows with no reference cycles.

use std::{
    collections::VecDeque,
    marker::PhantomData,
    sync::{Arc, Weak},
};

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use super::{
    ContextId,
    PipelineError,
    PipelineId,
    PipelineManager,
    error::Result,
    slot::{ErasedHandler, Message, Slot},
};
use crate::{
    metrics::{self, Direction},
    transport::{Transport, WriteFlags},
};

/// State every context of a pipeline can observe.
pub(crate) struct Shared {
    pub(crate) id: PipelineId,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) manager: Option<Weak<dyn PipelineManager>>,
    pub(crate) write_flags: WriteFlags,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            id: PipelineId::next(),
            transport: None,
            manager: None,
            write_flags: WriteFlags::NONE,
        }
    }

    fn manager(&self) -> Option<Arc<dyn PipelineManager>> {
        self.manager.as_ref().and_then(Weak::upgrade)
    }

    async fn write_to_transport(&self, msg: Message) -> Result<()> {
        let Some(transport) = &self.transport else {
            warn!(pipeline = %self.id, "outbound write reached the front without a transport");
            return Err(PipelineError::OutboundUnhandled { operation: "write" });
        };
        let buf = match msg.downcast::<Bytes>() {
            Ok(buf) => *buf,
            Err(msg) => match msg.downcast::<BytesMut>() {
                Ok(buf) => buf.freeze(),
                Err(msg) => match msg.downcast::<Vec<u8>>() {
                    Ok(buf) => Bytes::from(*buf),
                    Err(_) => {
                        warn!(pipeline = %self.id, "outbound message is not a byte buffer");
                        return Err(PipelineError::OutboundUnhandled { operation: "write" });
                    }
                },
            },
        };
        let len = buf.len();
        transport
            .write(buf, self.write_flags)
            .await
            .map_err(PipelineError::Transport)?;
        metrics::inc_frames(Direction::Outbound);
        debug!(pipeline = %self.id, len, "wrote buffer to transport");
        Ok(())
    }

    async fn close_transport(&self) -> Result<()> {
        let Some(transport) = &self.transport else {
            warn!(pipeline = %self.id, "outbound close reached the front without a transport");
            return Err(PipelineError::OutboundUnhandled { operation: "close" });
        };
        debug!(pipeline = %self.id, "closing transport");
        transport.close().await.map_err(PipelineError::Transport)
    }
}

/// Inbound events carried through the chain.
pub(crate) enum InboundEvent {
    Read(Message),
    Eof,
    Exception(PipelineError),
    Active,
    Inactive,
}

impl InboundEvent {
    fn reached_end(self, pipeline: PipelineId) {
        match self {
            Self::Read(_) => debug!(%pipeline, "inbound message reached the end of the pipeline; dropping"),
            Self::Exception(error) => {
                warn!(%pipeline, %error, "unhandled inbound exception reached the end of the pipeline");
            }
            Self::Eof => debug!(%pipeline, "end of input reached the end of the pipeline"),
            Self::Active | Self::Inactive => {}
        }
    }
}

/// Outbound operations queued by handlers during inbound traversal.
pub(crate) enum PendingOp {
    Write { issuer: ContextId, msg: Message },
    Close { issuer: ContextId },
}

impl PendingOp {
    pub(crate) fn issuer(&self) -> ContextId {
        match self {
            Self::Write { issuer, .. } | Self::Close { issuer } => *issuer,
        }
    }
}

/// Deliver `event` to the first inbound handler in `rest`.
pub(crate) fn propagate_inbound(
    rest: &mut [Slot],
    pending: &mut VecDeque<PendingOp>,
    shared: &Shared,
    event: InboundEvent,
) {
    let mut rest = rest;
    while let [current, after @ ..] = rest {
        if current.direction.is_inbound() {
            let link = InboundLink {
                rest: after,
                pending,
                issuer: current.id,
                shared,
            };
            current.handler.dispatch_inbound(link, event);
            return;
        }
        rest = after;
    }
    event.reached_end(shared.id);
}

/// Deliver `msg` to the last outbound handler in `before`, or to the
/// transport once the front is reached.
pub(crate) async fn propagate_write(before: &mut [Slot], shared: &Shared, msg: Message) -> Result<()> {
    let mut before = before;
    while let [prior @ .., current] = before {
        if current.direction.is_outbound() {
            let link = OutboundLink {
                before: prior,
                shared,
                id: current.id,
            };
            return current.handler.dispatch_write(link, msg).await;
        }
        before = prior;
    }
    shared.write_to_transport(msg).await
}

/// Deliver a close to the last outbound handler in `before`, or close the
/// transport once the front is reached.
pub(crate) async fn propagate_close(before: &mut [Slot], shared: &Shared) -> Result<()> {
    let mut before = before;
    while let [prior @ .., current] = before {
        if current.direction.is_outbound() {
            let link = OutboundLink {
                before: prior,
                shared,
                id: current.id,
            };
            return current.handler.dispatch_close(link).await;
        }
        before = prior;
    }
    shared.close_transport().await
}

pub(crate) struct InboundLink<'a> {
    rest: &'a mut [Slot],
    pending: &'a mut VecDeque<PendingOp>,
    issuer: ContextId,
    shared: &'a Shared,
}

impl<'a> InboundLink<'a> {
    pub(crate) fn new(
        rest: &'a mut [Slot],
        pending: &'a mut VecDeque<PendingOp>,
        issuer: ContextId,
        shared: &'a Shared,
    ) -> Self {
        Self {
            rest,
            pending,
            issuer,
            shared,
        }
    }

    fn fire(&mut self, event: InboundEvent) {
        propagate_inbound(self.rest, self.pending, self.shared, event);
    }
}

pub(crate) struct OutboundLink<'a> {
    before: &'a mut [Slot],
    shared: &'a Shared,
    id: ContextId,
}

/// View of the pipeline handed to a handler's inbound methods.
///
/// `Rout` and `Wout` are the handler's output types, so forwarding the wrong
/// type is a compile error.
pub struct InboundContext<'a, Rout, Wout> {
    link: InboundLink<'a>,
    _types: PhantomData<fn(Rout, Wout)>,
}

impl<'a, Rout, Wout> InboundContext<'a, Rout, Wout>
where
    Rout: Send + 'static,
    Wout: Send + 'static,
{
    pub(crate) fn new(link: InboundLink<'a>) -> Self {
        Self {
            link,
            _types: PhantomData,
        }
    }

    /// Forward `msg` to the next inbound handler.
    pub fn fire_read(&mut self, msg: Rout) { self.link.fire(InboundEvent::Read(Box::new(msg))); }

    /// Forward end of input.
    pub fn fire_read_eof(&mut self) { self.link.fire(InboundEvent::Eof); }

    /// Forward an error to the next inbound handler.
    pub fn fire_read_exception(&mut self, error: PipelineError) {
        self.link.fire(InboundEvent::Exception(error));
    }

    /// Forward transport activation.
    pub fn fire_transport_active(&mut self) { self.link.fire(InboundEvent::Active); }

    /// Forward transport deactivation.
    pub fn fire_transport_inactive(&mut self) { self.link.fire(InboundEvent::Inactive); }

    /// Queue `msg` for the outbound path, starting at this handler's
    /// outbound neighbour.
    ///
    /// Queued operations run in issue order on the next
    /// [`Pipeline::flush`](super::Pipeline::flush).
    pub fn fire_write(&mut self, msg: Wout) {
        self.link.pending.push_back(PendingOp::Write {
            issuer: self.link.issuer,
            msg: Box::new(msg),
        });
    }

    /// Queue a close for the outbound path.
    pub fn fire_close(&mut self) {
        self.link.pending.push_back(PendingOp::Close {
            issuer: self.link.issuer,
        });
    }

    /// Identifier of the handler's slot.
    #[must_use]
    pub fn context_id(&self) -> ContextId { self.link.issuer }

    /// Identifier of the owning pipeline.
    #[must_use]
    pub fn pipeline_id(&self) -> PipelineId { self.link.shared.id }

    /// Transport attached to the pipeline, if any.
    #[must_use]
    pub fn transport(&self) -> Option<&Arc<dyn Transport>> { self.link.shared.transport.as_ref() }

    /// Flags applied to writes reaching the transport.
    #[must_use]
    pub fn write_flags(&self) -> WriteFlags { self.link.shared.write_flags }

    /// Ask the pipeline's manager to delete the pipeline.
    ///
    /// Returns `false` when no manager is registered.
    pub fn delete_pipeline(&self) -> bool {
        self.link.shared.manager().is_some_and(|manager| {
            manager.delete_pipeline(self.link.shared.id);
            true
        })
    }

    /// Tell the pipeline's manager the connection saw activity.
    pub fn refresh_timeout(&self) {
        if let Some(manager) = self.link.shared.manager() {
            manager.refresh_timeout(self.link.shared.id);
        }
    }
}

/// View of the pipeline handed to a handler's outbound methods.
pub struct OutboundContext<'a, Wout> {
    link: OutboundLink<'a>,
    _types: PhantomData<fn(Wout)>,
}

impl<'a, Wout: Send + 'static> OutboundContext<'a, Wout> {
    pub(crate) fn new(link: OutboundLink<'a>) -> Self {
        Self {
            link,
            _types: PhantomData,
        }
    }

    /// Forward `msg` toward the transport, completing once every remaining
    /// handler and the transport have completed.
    ///
    /// # Errors
    ///
    /// Returns the first error raised further along the chain.
    pub async fn fire_write(&mut self, msg: Wout) -> Result<()> {
        propagate_write(self.link.before, self.link.shared, Box::new(msg)).await
    }

    /// Forward a close toward the transport.
    ///
    /// # Errors
    ///
    /// Returns the first error raised further along the chain.
    pub async fn fire_close(&mut self) -> Result<()> {
        propagate_close(self.link.before, self.link.shared).await
    }

    /// Identifier of the handler's slot.
    #[must_use]
    pub fn context_id(&self) -> ContextId { self.link.id }

    /// Identifier of the owning pipeline.
    #[must_use]
    pub fn pipeline_id(&self) -> PipelineId { self.link.shared.id }

    /// Transport attached to the pipeline, if any.
    #[must_use]
    pub fn transport(&self) -> Option<&Arc<dyn Transport>> { self.link.shared.transport.as_ref() }

    /// Ask the pipeline's manager to delete the pipeline.
    ///
    /// Returns `false` when no manager is registered.
    pub fn delete_pipeline(&self) -> bool {
        self.link.shared.manager().is_some_and(|manager| {
            manager.delete_pipeline(self.link.shared.id);
            true
        })
    }
}
