use galley_core::{CancellationToken, GalleyError};
use galley_queue::SharedQueue;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_single_producer_order_is_preserved() {
    let token = CancellationToken::new();
    let queue = SharedQueue::unbounded(&token);
    for i in 0..100u32 {
        queue.offer(i).unwrap();
    }
    let taken: Vec<u32> = (0..100).map(|_| queue.take().unwrap()).collect();
    assert_eq!(taken, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_no_loss_no_duplication() {
    let token = CancellationToken::new();
    let queue = SharedQueue::unbounded(&token);

    let producers: Vec<_> = (0..4u32)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..250u32 {
                    queue.offer(p * 1000 + i).unwrap();
                }
            })
        })
        .collect();
    let consumers: Vec<_> = (0..5)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || (0..200).map(|_| queue.take().unwrap()).collect::<Vec<u32>>())
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    let mut consumed: Vec<u32> = consumers
        .into_iter()
        .flat_map(|c| c.join().unwrap())
        .collect();
    consumed.sort_unstable();

    let mut expected: Vec<u32> = (0..4u32)
        .flat_map(|p| (0..250u32).map(move |i| p * 1000 + i))
        .collect();
    expected.sort_unstable();

    assert_eq!(consumed, expected);
    assert!(queue.is_empty());
    assert_eq!(queue.stats().offered, 1000);
    assert_eq!(queue.stats().taken, 1000);
}

#[test]
fn test_take_does_not_return_on_empty() {
    let token = CancellationToken::new();
    let queue = SharedQueue::<u32>::unbounded(&token);
    let waiter = {
        let queue = queue.clone();
        thread::spawn(move || queue.take())
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!waiter.is_finished());
    assert_eq!(queue.stats().taken, 0);

    queue.offer(9).unwrap();
    assert_eq!(waiter.join().unwrap().unwrap(), 9);
}

#[test]
fn test_one_offer_releases_exactly_one_waiter() {
    let token = CancellationToken::new();
    let queue = SharedQueue::<u32>::unbounded(&token);
    let woken = Arc::new(AtomicUsize::new(0));

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let queue = queue.clone();
            let woken = woken.clone();
            thread::spawn(move || {
                let result = queue.take();
                if result.is_ok() {
                    woken.fetch_add(1, Ordering::SeqCst);
                }
                result
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    queue.offer(42).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while woken.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    // Give the other waiters time to observe the signal and re-block.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(woken.load(Ordering::SeqCst), 1);
    assert!(queue.is_empty());
    assert_eq!(waiters.iter().filter(|w| w.is_finished()).count(), 1);

    token.cancel();
    let results: Vec<_> = waiters.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| matches!(r, Ok(42))).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(GalleyError::Cancelled)))
            .count(),
        2
    );
}

#[test]
fn test_take_after_cancel_fails_even_with_items() {
    let token = CancellationToken::new();
    let queue = SharedQueue::unbounded(&token);
    queue.offer(1u32).unwrap();
    token.cancel();
    assert!(queue.take().unwrap_err().is_cancelled());
    assert!(queue.take_timeout(Duration::from_secs(1)).is_err());
    assert_eq!(queue.drain(), vec![1]);
}

#[test]
fn test_bounded_queue_applies_backpressure() {
    let token = CancellationToken::new();
    let queue = SharedQueue::bounded(2, &token).unwrap();
    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 0..10u32 {
                queue.put(i).unwrap();
            }
        })
    };

    let mut taken = Vec::new();
    while taken.len() < 10 {
        assert!(queue.len() <= 2);
        taken.push(queue.take().unwrap());
    }
    producer.join().unwrap();
    assert_eq!(taken, (0..10).collect::<Vec<_>>());
}

fn run_interleaving(producers: usize, consumers: usize, per_producer: usize, capacity: Option<usize>) {
    let token = CancellationToken::new();
    let queue = SharedQueue::with_capacity(capacity, &token).unwrap();
    let total = producers * per_producer;

    let producer_handles: Vec<_> = (0..producers)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for seq in 0..per_producer {
                    queue.put((p, seq)).unwrap();
                }
            })
        })
        .collect();
    let consumer_handles: Vec<_> = (0..consumers)
        .map(|c| {
            let share = total / consumers + usize::from(c < total % consumers);
            let queue = queue.clone();
            thread::spawn(move || {
                (0..share)
                    .map(|_| queue.take().unwrap())
                    .collect::<Vec<(usize, usize)>>()
            })
        })
        .collect();

    for handle in producer_handles {
        handle.join().unwrap();
    }
    let per_consumer: Vec<Vec<(usize, usize)>> = consumer_handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    // Each consumer sees any one producer's items in production order.
    for seen in &per_consumer {
        let mut last: HashMap<usize, usize> = HashMap::new();
        for &(p, seq) in seen {
            if let Some(prev) = last.insert(p, seq) {
                assert!(prev < seq, "producer {} out of order: {} then {}", p, prev, seq);
            }
        }
    }

    let mut consumed: Vec<(usize, usize)> = per_consumer.into_iter().flatten().collect();
    consumed.sort_unstable();
    let expected: Vec<(usize, usize)> = (0..producers)
        .flat_map(|p| (0..per_producer).map(move |seq| (p, seq)))
        .collect();
    assert_eq!(consumed, expected);
    assert!(queue.is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_concurrent_offer_take_preserves_items(
        producers in 1usize..4,
        consumers in 1usize..4,
        per_producer in 0usize..60,
        capacity in proptest::option::of(1usize..8),
    ) {
        run_interleaving(producers, consumers, per_producer, capacity);
    }
}
