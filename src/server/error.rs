//! Errors raised by [`PipelineServer`](super::PipelineServer) operations.

use std::io;

use thiserror::Error;

use crate::connection_manager::ConfigError;

/// Errors that may occur while binding or running the server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Binding or configuring the listener failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),

    /// The connection manager configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
