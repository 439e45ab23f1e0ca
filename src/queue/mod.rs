//! Bucketed blocking queue dispatching work by priority.
//!
//! [`PriorityBlockingQueue`] keeps one bounded lock-free queue per priority
//! plus a counting semaphore whose permits track the number of resident
//! items. Takers wait on the semaphore and then scan buckets from the highest
//! priority down, so a take always returns an item from the highest
//! non-empty bucket at the time of its scan. Items sharing a bucket leave in
//! the order they arrived.
//!
//! The semaphore wakes waiting takers in FIFO order.

mod errors;

use crossbeam_queue::ArrayQueue;
pub use errors::{QueueConfigError, QueueFull};
use tokio::sync::Semaphore;
use tracing::debug;

/// Lowest priority; always maps to bucket 0.
pub const LO_PRI: i8 = i8::MIN;
/// Default priority; maps to the middle bucket.
pub const MID_PRI: i8 = 0;
/// Highest priority; always maps to the last bucket.
pub const HI_PRI: i8 = i8::MAX;

/// Multi-producer, multi-consumer queue with `N` bounded priority buckets.
///
/// # Examples
///
/// ```
/// use wirechain::queue::PriorityBlockingQueue;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let queue = PriorityBlockingQueue::new(5, 16).expect("valid config");
/// queue.add_with_priority("low", -2).expect("room");
/// queue.add_with_priority("high", 2).expect("room");
/// assert_eq!(queue.take().await, "high");
/// assert_eq!(queue.take().await, "low");
/// # }
/// ```
#[derive(Debug)]
pub struct PriorityBlockingQueue<T> {
    buckets: Vec<ArrayQueue<T>>,
    permits: Semaphore,
    num_priorities: u8,
}

impl<T> PriorityBlockingQueue<T> {
    /// Create a queue with `num_priorities` buckets holding up to
    /// `capacity` items each.
    ///
    /// # Errors
    ///
    /// Returns [`QueueConfigError`] if either argument is zero.
    pub fn new(num_priorities: u8, capacity: usize) -> Result<Self, QueueConfigError> {
        if num_priorities == 0 {
            return Err(QueueConfigError::NoPriorities);
        }
        if capacity == 0 {
            return Err(QueueConfigError::ZeroCapacity);
        }
        Ok(Self {
            buckets: (0..num_priorities).map(|_| ArrayQueue::new(capacity)).collect(),
            permits: Semaphore::new(0),
            num_priorities,
        })
    }

    /// Number of priority buckets.
    #[must_use]
    pub fn num_priorities(&self) -> u8 { self.num_priorities }

    /// Capacity of each bucket.
    #[must_use]
    pub fn bucket_capacity(&self) -> usize { self.buckets.first().map_or(0, ArrayQueue::capacity) }

    /// Bucket index used for `priority`.
    ///
    /// Priorities are offsets from the middle bucket `N / 2`, clamped to
    /// `0..N`.
    #[must_use]
    pub fn bucket_for(&self, priority: i8) -> usize {
        let mid = i16::from(self.num_priorities / 2);
        let last = i16::from(self.num_priorities) - 1;
        usize::from((mid + i16::from(priority)).clamp(0, last).unsigned_abs())
    }

    /// Enqueue `item` at [`MID_PRI`].
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] with the item if the middle bucket is full.
    pub fn add(&self, item: T) -> Result<(), QueueFull<T>> { self.add_with_priority(item, MID_PRI) }

    /// Enqueue `item` at `priority`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueFull`] with the item if the target bucket is full.
    pub fn add_with_priority(&self, item: T, priority: i8) -> Result<(), QueueFull<T>> {
        let bucket = self.bucket_for(priority);
        let Some(queue) = self.buckets.get(bucket) else {
            return Err(QueueFull { item, bucket });
        };
        if let Err(item) = queue.push(item) {
            debug!(bucket, priority, "priority queue bucket full");
            return Err(QueueFull { item, bucket });
        }
        self.permits.add_permits(1);
        Ok(())
    }

    /// Dequeue the highest-priority item, waiting until one is available.
    ///
    /// There is no built-in timeout; wrap the call in
    /// `tokio::time::timeout` to bound the wait.
    pub async fn take(&self) -> T {
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
        self.claim()
    }

    /// Dequeue the highest-priority item if one is available.
    pub fn try_take(&self) -> Option<T> {
        let permit = self.permits.try_acquire().ok()?;
        permit.forget();
        Some(self.claim())
    }

    /// Blocking form of [`take`](Self::take) for plain worker threads.
    ///
    /// Must not be called from within an async task.
    pub fn take_blocking(&self) -> T { futures::executor::block_on(self.take()) }

    /// Total items across all buckets.
    ///
    /// Buckets are summed one at a time, so under concurrent use the result
    /// is a snapshot rather than an atomic count.
    #[must_use]
    pub fn size(&self) -> usize { self.buckets.iter().map(ArrayQueue::len).sum() }

    /// Whether every bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.buckets.iter().all(ArrayQueue::is_empty) }

    // Callers hold a permit, so at least one item is resident.
    fn claim(&self) -> T {
        loop {
            if let Some(item) = self.buckets.iter().rev().find_map(ArrayQueue::pop) {
                return item;
            }
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests;
