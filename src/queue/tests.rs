//! Unit tests for the priority queue.

use std::{sync::Arc, time::Duration};

use proptest::prelude::*;
use rstest::{fixture, rstest};

use super::*;

#[fixture]
fn queue() -> PriorityBlockingQueue<u32> { PriorityBlockingQueue::new(5, 4).expect("valid config") }

#[rstest]
#[case(-10, 0)]
#[case(-1, 1)]
#[case(0, 2)]
#[case(1, 3)]
#[case(10, 4)]
#[case(LO_PRI, 0)]
#[case(HI_PRI, 4)]
fn priorities_clamp_to_buckets(queue: PriorityBlockingQueue<u32>, #[case] priority: i8, #[case] bucket: usize) {
    assert_eq!(queue.bucket_for(priority), bucket);
}

#[rstest]
fn even_bucket_counts_round_the_middle_up() {
    let queue = PriorityBlockingQueue::<u32>::new(4, 1).expect("valid config");
    assert_eq!(queue.bucket_for(MID_PRI), 2);
    assert_eq!(queue.bucket_for(-2), 0);
    assert_eq!(queue.bucket_for(2), 3);
}

#[rstest]
fn single_bucket_takes_every_priority() {
    let queue = PriorityBlockingQueue::<u32>::new(1, 1).expect("valid config");
    assert_eq!(queue.bucket_for(LO_PRI), 0);
    assert_eq!(queue.bucket_for(HI_PRI), 0);
}

#[rstest]
#[tokio::test]
async fn take_prefers_higher_priority(queue: PriorityBlockingQueue<u32>) {
    queue.add_with_priority(1, -2).expect("room");
    queue.add_with_priority(2, 2).expect("room");

    assert_eq!(queue.take().await, 2);
    assert_eq!(queue.take().await, 1);
}

#[rstest]
#[tokio::test]
async fn items_sharing_a_bucket_keep_arrival_order(queue: PriorityBlockingQueue<u32>) {
    for item in 0..3 {
        queue.add(item).expect("room");
    }
    assert_eq!(queue.take().await, 0);
    assert_eq!(queue.take().await, 1);
    assert_eq!(queue.take().await, 2);
}

#[rstest]
fn full_bucket_returns_the_item(queue: PriorityBlockingQueue<u32>) {
    for item in 0..4 {
        queue.add_with_priority(item, 1).expect("room");
    }

    let err = queue.add_with_priority(99, 1).expect_err("bucket full");

    assert_eq!(err, QueueFull { item: 99, bucket: 3 });
    assert_eq!(err.into_inner(), 99);
    queue.add_with_priority(100, 0).expect("other buckets still have room");
    assert_eq!(queue.size(), 5);
}

#[rstest]
fn try_take_on_empty_queue_returns_none(queue: PriorityBlockingQueue<u32>) {
    assert!(queue.is_empty());
    assert_eq!(queue.try_take(), None);
    queue.add(7).expect("room");
    assert_eq!(queue.try_take(), Some(7));
    assert_eq!(queue.try_take(), None);
}

#[rstest]
#[tokio::test]
async fn take_waits_for_an_item() {
    let queue = Arc::new(PriorityBlockingQueue::new(3, 2).expect("valid config"));
    let taker = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move { queue.take().await }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!taker.is_finished());
    queue.add("work").expect("room");

    assert_eq!(taker.await.expect("join taker"), "work");
}

#[rstest]
fn take_blocking_serves_plain_threads() {
    let queue = Arc::new(PriorityBlockingQueue::new(3, 2).expect("valid config"));
    let worker = std::thread::spawn({
        let queue = Arc::clone(&queue);
        move || queue.take_blocking()
    });

    queue.add_with_priority(5u8, HI_PRI).expect("room");

    assert_eq!(worker.join().expect("join worker"), 5);
    assert_eq!(queue.size(), 0);
}

#[rstest]
#[case(0, 1, QueueConfigError::NoPriorities)]
#[case(3, 0, QueueConfigError::ZeroCapacity)]
fn invalid_configuration_is_rejected(
    #[case] priorities: u8,
    #[case] capacity: usize,
    #[case] expected: QueueConfigError,
) {
    assert_eq!(PriorityBlockingQueue::<u32>::new(priorities, capacity).err(), Some(expected));
}

proptest! {
    #[test]
    fn size_tracks_adds_minus_takes(
        priorities in proptest::collection::vec(any::<i8>(), 0..32),
        takes in 0usize..32,
    ) {
        let queue = PriorityBlockingQueue::new(7, 32).expect("valid config");
        for (item, priority) in priorities.iter().enumerate() {
            queue.add_with_priority(item, *priority).expect("room");
        }
        let takes = takes.min(priorities.len());
        let mut last_bucket = usize::MAX;
        for _ in 0..takes {
            let item = queue.try_take().expect("item available");
            let bucket = queue.bucket_for(priorities[item]);
            prop_assert!(bucket <= last_bucket);
            last_bucket = bucket;
        }
        prop_assert_eq!(queue.size(), priorities.len() - takes);
    }
}
