//! Convenience imports for writing handlers and assembling pipelines.
//!
//! Connection management and queue types are left to their owning modules.
//!
//! # Examples
//!
//! ```
//! use bytes::Bytes;
//! use wirechain::prelude::*;
//!
//! struct Count(usize);
//!
//! impl Handler for Count {
//!     type Rin = Bytes;
//!     type Rout = Bytes;
//!     type Win = Bytes;
//!     type Wout = Bytes;
//!
//!     const DIRECTION: HandlerDir = HandlerDir::In;
//!
//!     fn read(&mut self, ctx: &mut InboundContext<'_, Bytes, Bytes>, msg: Bytes) {
//!         self.0 += msg.len();
//!         ctx.fire_read(msg);
//!     }
//! }
//!
//! let mut pipeline: Pipeline<Bytes> = Pipeline::new();
//! pipeline.add_back(Count(0));
//! ```

pub use crate::{
    codec::LengthFieldPrepender,
    pipeline::{
        Handler,
        HandlerDir,
        InboundContext,
        InboundEndpoint,
        OutboundContext,
        OutboundEndpoint,
        Pipeline,
        PipelineError,
        Result,
    },
    server::{PipelineServer, ServerError},
    transport::{StreamTransport, Transport, WriteFlags},
};
