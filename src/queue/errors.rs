//! Error types for priority queue operations and configuration.

use thiserror::Error;

/// The bucket selected for an item was at capacity.
///
/// The rejected item is handed back unchanged.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("priority bucket {bucket} is full")]
pub struct QueueFull<T> {
    /// The item that could not be enqueued.
    pub item: T,
    /// Index of the full bucket.
    pub bucket: usize,
}

impl<T> QueueFull<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T { self.item }
}

/// Errors returned when creating a priority queue.
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueConfigError {
    /// At least one priority bucket is required.
    #[error("invalid priority count 0; must be >= 1")]
    NoPriorities,
    /// Buckets must hold at least one item.
    #[error("invalid bucket capacity 0; must be >= 1")]
    ZeroCapacity,
}
