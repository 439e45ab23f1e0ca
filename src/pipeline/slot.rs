//! Type-erased storage for installed handlers.
//!
//! Each handler lives in a [`Slot`] owned by the pipeline's arena. Messages
//! cross slot boundaries boxed as `dyn Any` and are downcast on entry; the
//! chain is type-checked before traversal so the downcasts only fail for
//! writes issued from inbound-only handlers.

use std::any::{Any, TypeId};

use async_trait::async_trait;

use super::{
    ContextId,
    Handler,
    HandlerDir,
    InboundContext,
    OutboundContext,
    PipelineError,
    context::{InboundEvent, InboundLink, OutboundLink},
    error::Result,
};

/// A message in flight between two slots.
pub(crate) type Message = Box<dyn Any + Send>;

/// Runtime identity of a message type.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MessageType {
    id: TypeId,
    pub(crate) name: &'static str,
}

impl MessageType {
    pub(crate) fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}

/// Message types a handler accepts and emits in each direction.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SlotTypes {
    pub(crate) rin: MessageType,
    pub(crate) rout: MessageType,
    pub(crate) win: MessageType,
    pub(crate) wout: MessageType,
}

pub(crate) struct Slot {
    pub(crate) id: ContextId,
    pub(crate) direction: HandlerDir,
    pub(crate) types: SlotTypes,
    pub(crate) handler: Box<dyn ErasedHandler>,
}

impl Slot {
    pub(crate) fn new<H: Handler>(id: ContextId, handler: H) -> Self {
        Self {
            id,
            direction: H::DIRECTION,
            types: SlotTypes {
                rin: MessageType::of::<H::Rin>(),
                rout: MessageType::of::<H::Rout>(),
                win: MessageType::of::<H::Win>(),
                wout: MessageType::of::<H::Wout>(),
            },
            handler: Box::new(handler),
        }
    }

    pub(crate) fn name(&self) -> &str { self.handler.handler_name() }

    pub(crate) fn is<H: Handler>(&self) -> bool { self.handler.as_any().is::<H>() }
}

#[async_trait]
pub(crate) trait ErasedHandler: Send {
    fn handler_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn attach(&mut self, id: ContextId);

    fn detach(&mut self, id: ContextId);

    fn dispatch_inbound(&mut self, link: InboundLink<'_>, event: InboundEvent);

    async fn dispatch_write(&mut self, link: OutboundLink<'_>, msg: Message) -> Result<()>;

    async fn dispatch_close(&mut self, link: OutboundLink<'_>) -> Result<()>;
}

#[async_trait]
impl<H: Handler> ErasedHandler for H {
    fn handler_name(&self) -> &str { Handler::name(self) }

    fn as_any(&self) -> &dyn Any { self }

    fn as_any_mut(&mut self) -> &mut dyn Any { self }

    fn into_any(self: Box<Self>) -> Box<dyn Any> { self }

    fn attach(&mut self, id: ContextId) { self.attach_pipeline(id); }

    fn detach(&mut self, id: ContextId) { self.detach_pipeline(id); }

    fn dispatch_inbound(&mut self, link: InboundLink<'_>, event: InboundEvent) {
        let mut ctx = InboundContext::<H::Rout, H::Wout>::new(link);
        match event {
            InboundEvent::Read(msg) => match msg.downcast::<H::Rin>() {
                Ok(msg) => self.read(&mut ctx, *msg),
                Err(_) => {
                    let error = PipelineError::TypeMismatch {
                        upstream: "previous handler".to_owned(),
                        downstream: Handler::name(self).to_owned(),
                        expected: "unknown",
                        found: std::any::type_name::<H::Rin>(),
                    };
                    ctx.fire_read_exception(error);
                }
            },
            InboundEvent::Eof => self.read_eof(&mut ctx),
            InboundEvent::Exception(error) => self.read_exception(&mut ctx, error),
            InboundEvent::Active => self.transport_active(&mut ctx),
            InboundEvent::Inactive => self.transport_inactive(&mut ctx),
        }
    }

    async fn dispatch_write(&mut self, link: OutboundLink<'_>, msg: Message) -> Result<()> {
        let Ok(msg) = msg.downcast::<H::Win>() else {
            return Err(PipelineError::TypeMismatch {
                upstream: "previous handler".to_owned(),
                downstream: Handler::name(self).to_owned(),
                expected: "unknown",
                found: std::any::type_name::<H::Win>(),
            });
        };
        let mut ctx = OutboundContext::<H::Wout>::new(link);
        Handler::write(self, &mut ctx, *msg).await
    }

    async fn dispatch_close(&mut self, link: OutboundLink<'_>) -> Result<()> {
        let mut ctx = OutboundContext::<H::Wout>::new(link);
        Handler::close(self, &mut ctx).await
    }
}
