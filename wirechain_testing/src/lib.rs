//! Test doubles for exercising `wirechain` pipelines and connection
//! managers without sockets.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use wirechain::{
//!     codec::LengthFieldPrepender,
//!     pipeline::{OutboundEndpoint, Pipeline},
//!     transport::Transport,
//! };
//! use wirechain_testing::RecordingTransport;
//!
//! # async fn example() {
//! let transport = Arc::new(RecordingTransport::default());
//! let mut pipeline: Pipeline<(), Bytes> =
//!     Pipeline::with_transport(Arc::clone(&transport) as Arc<dyn Transport>);
//! pipeline.add_back(LengthFieldPrepender::new(1).unwrap());
//! pipeline.write(Bytes::from_static(b"hi")).await.unwrap();
//! assert_eq!(transport.written(), b"\x02hi");
//! # }
//! ```

mod callback;
mod connection;
pub mod logging;
mod metrics;
mod transport;

pub use callback::{CallbackEvent, RecordingCallback};
pub use connection::{ConnectionEvent, FakeConnection};
pub use logging::{LoggerHandle, logger};
pub use metrics::{MetricsCapture, capture_metrics};
pub use transport::RecordingTransport;
pub use wirechain::timer::ManualTimer;
