//! Errors raised while building or traversing a pipeline.

use std::io;

use thiserror::Error;

use crate::codec::EncodingError;

/// Errors surfaced by [`Pipeline`](super::Pipeline) operations and handlers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// A removal matched no handler, or more than one.
    #[error("expected exactly one handler matching `{handler}`, found {matches}")]
    HandlerNotFound {
        /// Type name or context id that was looked up.
        handler: String,
        /// Number of handlers that matched.
        matches: usize,
    },

    /// Adjacent handlers disagree on the message type flowing between them.
    #[error("`{upstream}` emits `{expected}` but `{downstream}` accepts `{found}`")]
    TypeMismatch {
        /// Handler producing the message, or `pipeline` at an entry point.
        upstream: String,
        /// Handler receiving the message.
        downstream: String,
        /// Type produced upstream.
        expected: &'static str,
        /// Type accepted downstream.
        found: &'static str,
    },

    /// An outbound operation reached the front of the chain with nowhere to
    /// go: no transport is attached, or the message is not a byte buffer.
    #[error("outbound {operation} reached the front of the pipeline unhandled")]
    OutboundUnhandled {
        /// `write` or `close`.
        operation: &'static str,
    },

    /// A handler received an event it does not implement.
    #[error("handler `{handler}` does not implement {operation}")]
    NotImplemented {
        /// Name of the handler.
        handler: String,
        /// Name of the missing operation.
        operation: &'static str,
    },

    /// A codec could not encode an outbound message.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// The transport failed to write or close.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// Handler-defined failure.
    #[error("handler error: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PipelineError {
    /// Wrap an arbitrary handler error.
    pub fn handler<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Handler(Box::new(error))
    }
}

/// Result alias for pipeline operations.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
