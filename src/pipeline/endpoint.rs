//! Direction-gated entry points.
//!
//! [`InboundEndpoint`] is implemented only when the pipeline's read type is a
//! [`PipelineMessage`], and [`OutboundEndpoint`] only when its write type is.
//! The unit type is not a message, so a unidirectional pipeline rejects the
//! disabled direction at compile time:
//!
//! ```compile_fail
//! use bytes::Bytes;
//! use wirechain::pipeline::{InboundEndpoint, Pipeline};
//!
//! let mut pipeline: Pipeline<(), Bytes> = Pipeline::new();
//! pipeline.read(()).unwrap();
//! ```
//!
//! ```compile_fail
//! use bytes::Bytes;
//! use wirechain::pipeline::{InboundEndpoint, Pipeline};
//!
//! let mut pipeline: Pipeline<(), Bytes> = Pipeline::new();
//! pipeline.read_eof().unwrap();
//! ```
//!
//! ```compile_fail
//! use bytes::Bytes;
//! use wirechain::pipeline::{OutboundEndpoint, Pipeline};
//!
//! async fn send(mut pipeline: Pipeline<Bytes, ()>) {
//!     pipeline.write(()).await.unwrap();
//! }
//! ```
//!
//! ```compile_fail
//! use bytes::Bytes;
//! use wirechain::pipeline::{OutboundEndpoint, Pipeline};
//!
//! async fn shut(mut pipeline: Pipeline<Bytes, ()>) {
//!     pipeline.close().await.unwrap();
//! }
//! ```

use async_trait::async_trait;

use super::{
    Pipeline,
    PipelineError,
    PipelineMessage,
    context::{InboundEvent, propagate_close, propagate_write},
    error::Result,
};
use crate::metrics::{self, Direction};

/// Inbound entry points of a pipeline whose read type is a message.
///
/// Events enter at the front and walk toward the back.
pub trait InboundEndpoint<R> {
    /// Push `msg` into the front of the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TypeMismatch`] if the chain is mistyped.
    fn read(&mut self, msg: R) -> Result<()>;

    /// Signal end of input.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TypeMismatch`] if the chain is mistyped.
    fn read_eof(&mut self) -> Result<()>;

    /// Deliver a transport error to the inbound handlers.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TypeMismatch`] if the chain is mistyped.
    fn read_exception(&mut self, error: PipelineError) -> Result<()>;

    /// Signal that the transport became active.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TypeMismatch`] if the chain is mistyped.
    fn transport_active(&mut self) -> Result<()>;

    /// Signal that the transport became inactive.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TypeMismatch`] if the chain is mistyped.
    fn transport_inactive(&mut self) -> Result<()>;
}

/// Outbound entry points of a pipeline whose write type is a message.
///
/// Operations enter at the back and walk toward the transport. The returned
/// future completes once every remaining handler has completed, in order.
#[async_trait]
pub trait OutboundEndpoint<W>: Send {
    /// Write `msg` through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a handler or the transport.
    async fn write(&mut self, msg: W) -> Result<()>;

    /// Close the pipeline's transport through the outbound handlers.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a handler or the transport.
    async fn close(&mut self) -> Result<()>;
}

impl<R: PipelineMessage, W: 'static> InboundEndpoint<R> for Pipeline<R, W> {
    fn read(&mut self, msg: R) -> Result<()> {
        metrics::inc_frames(Direction::Inbound);
        self.fire_inbound(InboundEvent::Read(Box::new(msg)))
    }

    fn read_eof(&mut self) -> Result<()> { self.fire_inbound(InboundEvent::Eof) }

    fn read_exception(&mut self, error: PipelineError) -> Result<()> {
        self.fire_inbound(InboundEvent::Exception(error))
    }

    fn transport_active(&mut self) -> Result<()> { self.fire_inbound(InboundEvent::Active) }

    fn transport_inactive(&mut self) -> Result<()> { self.fire_inbound(InboundEvent::Inactive) }
}

#[async_trait]
impl<R: 'static, W: PipelineMessage> OutboundEndpoint<W> for Pipeline<R, W> {
    async fn write(&mut self, msg: W) -> Result<()> {
        self.validate()?;
        propagate_write(&mut self.slots, &self.shared, Box::new(msg)).await
    }

    async fn close(&mut self) -> Result<()> {
        self.validate()?;
        propagate_close(&mut self.slots, &self.shared).await
    }
}
