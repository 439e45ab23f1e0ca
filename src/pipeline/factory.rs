//! Pipeline construction and ownership hooks.

use std::sync::Arc;

use super::{Pipeline, PipelineId};
use crate::transport::Transport;

/// Builds a fresh pipeline for each accepted transport.
///
/// Any `Fn(Arc<dyn Transport>) -> Pipeline<R, W>` closure is a factory.
pub trait PipelineFactory<R, W>: Send + Sync {
    /// Create the pipeline for a new connection.
    fn new_pipeline(&self, transport: Arc<dyn Transport>) -> Pipeline<R, W>;
}

impl<R, W, F> PipelineFactory<R, W> for F
where
    F: Fn(Arc<dyn Transport>) -> Pipeline<R, W> + Send + Sync,
{
    fn new_pipeline(&self, transport: Arc<dyn Transport>) -> Pipeline<R, W> { self(transport) }
}

/// Owner of a set of pipelines that handlers may ask to tear one down.
///
/// The pipeline holds only a weak reference to its manager.
pub trait PipelineManager: Send + Sync {
    /// Delete the pipeline identified by `id`. Called from inside a
    /// traversal, so implementations must defer the actual teardown.
    fn delete_pipeline(&self, id: PipelineId);

    /// The pipeline identified by `id` observed activity.
    fn refresh_timeout(&self, _id: PipelineId) {}
}
