//! The handler contract and the message marker trait.

use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::{
    ContextId,
    InboundContext,
    OutboundContext,
    PipelineError,
};

/// Which traversal directions a handler takes part in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerDir {
    /// Visited by inbound events only.
    In,
    /// Visited by outbound operations only.
    Out,
    /// Visited in both directions.
    Both,
}

impl HandlerDir {
    /// Whether inbound events visit this handler.
    #[must_use]
    pub const fn is_inbound(self) -> bool { matches!(self, Self::In | Self::Both) }

    /// Whether outbound operations visit this handler.
    #[must_use]
    pub const fn is_outbound(self) -> bool { matches!(self, Self::Out | Self::Both) }
}

/// Types that can enter a pipeline through its public endpoints.
///
/// The unit type deliberately does not implement this trait: a
/// `Pipeline<(), W>` exposes no inbound entry points and a `Pipeline<R, ()>`
/// exposes no outbound ones. Implement it for your own message types.
pub trait PipelineMessage: Send + 'static {}

impl PipelineMessage for Bytes {}
impl PipelineMessage for BytesMut {}
impl PipelineMessage for String {}
impl<T: Send + 'static> PipelineMessage for Vec<T> {}
impl<T: Send + 'static> PipelineMessage for VecDeque<T> {}
impl<T: ?Sized + Send + 'static> PipelineMessage for Box<T> {}
impl<T: ?Sized + Send + Sync + 'static> PipelineMessage for Arc<T> {}

/// A unit of logic installed in a [`Pipeline`](super::Pipeline).
///
/// Inbound events arrive as `Rin` and are forwarded as `Rout`; outbound
/// writes arrive as `Win` and are forwarded as `Wout`. Inbound methods are
/// synchronous and forward through an [`InboundContext`]. Outbound methods
/// are asynchronous and complete once the remainder of the chain toward the
/// transport has completed.
///
/// Every inbound method except [`read`](Handler::read) forwards by default,
/// as does [`close`](Handler::close). Handlers set [`DIRECTION`] to skip the
/// traversal they take no part in.
///
/// [`DIRECTION`]: Handler::DIRECTION
///
/// ```
/// use async_trait::async_trait;
/// use bytes::Bytes;
/// use wirechain::pipeline::{Handler, HandlerDir, InboundContext};
///
/// struct Upper;
///
/// #[async_trait]
/// impl Handler for Upper {
///     type Rin = String;
///     type Rout = String;
///     type Win = Bytes;
///     type Wout = Bytes;
///
///     const DIRECTION: HandlerDir = HandlerDir::In;
///
///     fn read(&mut self, ctx: &mut InboundContext<'_, String, Bytes>, msg: String) {
///         ctx.fire_read(msg.to_uppercase());
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + 'static {
    /// Inbound message accepted by this handler.
    type Rin: Send + 'static;
    /// Inbound message forwarded to the next handler.
    type Rout: Send + 'static;
    /// Outbound message accepted by this handler.
    type Win: Send + 'static;
    /// Outbound message forwarded toward the transport.
    type Wout: Send + 'static;

    /// Traversal directions this handler takes part in.
    const DIRECTION: HandlerDir = HandlerDir::Both;

    /// Name used in logs and errors.
    fn name(&self) -> &str { std::any::type_name::<Self>() }

    /// Called once the handler has been installed under `id`.
    fn attach_pipeline(&mut self, _id: ContextId) {}

    /// Called when the handler leaves the pipeline, either by removal or
    /// during [`finalize`](super::Pipeline::finalize).
    fn detach_pipeline(&mut self, _id: ContextId) {}

    /// Handle an inbound message.
    fn read(&mut self, ctx: &mut InboundContext<'_, Self::Rout, Self::Wout>, _msg: Self::Rin) {
        let error = PipelineError::NotImplemented {
            handler: self.name().to_owned(),
            operation: "read",
        };
        ctx.fire_read_exception(error);
    }

    /// Handle end of input.
    fn read_eof(&mut self, ctx: &mut InboundContext<'_, Self::Rout, Self::Wout>) {
        ctx.fire_read_eof();
    }

    /// Handle an error raised further up the inbound path.
    fn read_exception(
        &mut self,
        ctx: &mut InboundContext<'_, Self::Rout, Self::Wout>,
        error: PipelineError,
    ) {
        ctx.fire_read_exception(error);
    }

    /// Handle the transport becoming active.
    fn transport_active(&mut self, ctx: &mut InboundContext<'_, Self::Rout, Self::Wout>) {
        ctx.fire_transport_active();
    }

    /// Handle the transport becoming inactive.
    fn transport_inactive(&mut self, ctx: &mut InboundContext<'_, Self::Rout, Self::Wout>) {
        ctx.fire_transport_inactive();
    }

    /// Handle an outbound write.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotImplemented`] unless overridden, or any
    /// error from the remainder of the chain.
    async fn write(
        &mut self,
        _ctx: &mut OutboundContext<'_, Self::Wout>,
        _msg: Self::Win,
    ) -> Result<(), PipelineError> {
        Err(PipelineError::NotImplemented {
            handler: self.name().to_owned(),
            operation: "write",
        })
    }

    /// Handle an outbound close.
    ///
    /// # Errors
    ///
    /// Returns any error from the remainder of the chain.
    async fn close(&mut self, ctx: &mut OutboundContext<'_, Self::Wout>) -> Result<(), PipelineError> {
        ctx.fire_close().await
    }
}
