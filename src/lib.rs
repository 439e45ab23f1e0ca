#![doc(html_root_url = "https://docs.rs/wirechain/latest")]
//! Public API for the `wirechain` library.
//!
//! This crate provides building blocks for pipeline-based network servers:
//! a typed, bidirectional chain of protocol handlers, a connection manager
//! with idle timeouts and graceful draining, a bucketed priority queue for
//! dispatching work, a length-field framing encoder, and file regions that
//! stream straight to a transport.

pub mod codec;
pub mod connection_manager;
pub mod file_region;
pub mod metrics;
pub mod pipeline;
pub mod prelude;
pub mod queue;
pub mod server;
pub mod timer;
pub mod transport;

pub use codec::{EncodingError, LengthFieldPrepender};
pub use connection_manager::{ConnectionManager, ConnectionManagerConfig, ManagedConnection};
pub use file_region::FileRegion;
pub use metrics::{CONNECTIONS_MANAGED, Direction, ERRORS_TOTAL, FRAMES_PROCESSED, IDLE_DROPS_TOTAL};
pub use pipeline::{Handler, Pipeline, PipelineError};
pub use queue::PriorityBlockingQueue;
pub use server::{ConnectionId, PipelineServer, ServerError};
