//! Priority queue under concurrent producers and consumers.

use std::{collections::HashSet, sync::Arc, thread, time::Duration};

use rstest::rstest;
use tokio::{task::JoinSet, time::timeout};
use wirechain::queue::{HI_PRI, LO_PRI, PriorityBlockingQueue};

const PRODUCERS: usize = 4;
const PER_PRODUCER: usize = 250;

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_item_is_taken_exactly_once() {
    let queue = Arc::new(PriorityBlockingQueue::new(3, PRODUCERS * PER_PRODUCER).expect("valid config"));
    let mut consumers = JoinSet::new();
    for _ in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        consumers.spawn(async move {
            let mut taken = Vec::with_capacity(PER_PRODUCER);
            for _ in 0..PER_PRODUCER {
                taken.push(queue.take().await);
            }
            taken
        });
    }

    let mut producers = JoinSet::new();
    for producer in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        producers.spawn(async move {
            for n in 0..PER_PRODUCER {
                let priority = [LO_PRI, 0, HI_PRI][n % 3];
                queue
                    .add_with_priority(producer * PER_PRODUCER + n, priority)
                    .expect("bucket has room");
                tokio::task::yield_now().await;
            }
        });
    }
    while let Some(done) = producers.join_next().await {
        done.expect("producer");
    }

    let mut seen = HashSet::new();
    let collected = timeout(Duration::from_secs(10), async {
        while let Some(taken) = consumers.join_next().await {
            seen.extend(taken.expect("consumer"));
        }
    })
    .await;
    assert!(collected.is_ok(), "consumers starved");

    assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
    assert!(queue.is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn take_on_an_empty_queue_waits() {
    let queue: PriorityBlockingQueue<u8> = PriorityBlockingQueue::new(2, 4).expect("valid config");

    assert!(timeout(Duration::from_millis(50), queue.take()).await.is_err());

    queue.add(7).expect("room");
    assert_eq!(timeout(Duration::from_millis(50), queue.take()).await, Ok(7));
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_taker_wakes_on_add() {
    let queue = Arc::new(PriorityBlockingQueue::new(2, 4).expect("valid config"));
    let taker = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move { queue.take().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!taker.is_finished());

    queue.add_with_priority("late", HI_PRI).expect("room");

    let item = timeout(Duration::from_secs(5), taker)
        .await
        .expect("taker woke")
        .expect("join taker");
    assert_eq!(item, "late");
}

#[rstest]
fn blocking_takers_run_on_plain_threads() {
    let queue = Arc::new(PriorityBlockingQueue::new(4, 8).expect("valid config"));
    let worker = thread::spawn({
        let queue = Arc::clone(&queue);
        move || (queue.take_blocking(), queue.take_blocking())
    });

    queue.add_with_priority(1, LO_PRI).expect("room");
    queue.add_with_priority(2, LO_PRI).expect("room");

    let (first, second) = worker.join().expect("worker thread");
    assert_eq!((first, second), (1, 2));
}
