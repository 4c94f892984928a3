// Integration tests for the randomized delay queue
//
// Tests conservation across a full window, temporal misuse, catch-up draining
// and concurrent producers.

use mixhop_core::crypto::SecureRandomSource;
use mixhop_core::{QueueConfig, RandomQueue};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;

#[test]
fn test_queue_conserves_every_message() {
    let window = 3600; // 1h
    let granularity = 10; // 360 slices
    let messages_per_window = 3600;
    let queue = RandomQueue::<u64>::new(window, granularity, messages_per_window).unwrap();
    assert_eq!(queue.rounds(), 360);

    for i in 0..7200u64 {
        queue.add(3600 + i, i, 3600 + i).unwrap();
    }
    assert_eq!(queue.len(), 7200);

    let mut delivered = Vec::with_capacity(7200);
    for now in (3600..10_000).step_by(10) {
        delivered.extend(queue.get_send_queue(now));
    }
    assert_eq!(delivered.len(), 7200, "Messages lost or duplicated");

    for now in (10_000..100_000).step_by(10) {
        assert!(
            queue.get_send_queue(now).is_empty(),
            "Drained queue returned messages at {}",
            now
        );
    }

    delivered.sort_unstable();
    assert_eq!(delivered, (0..7200).collect::<Vec<_>>());

    println!("✓ 7200 messages delivered exactly once");
}

#[test]
fn test_repeated_poll_is_a_no_op() {
    let queue = RandomQueue::<u64>::new(60, 10, 60).unwrap();
    queue.add(1010, 1, 1000).unwrap();

    assert!(queue.get_send_queue(1000).is_empty());
    let cursor = queue.read_position();

    for now in [1000, 1005, 999, 10] {
        assert!(queue.get_send_queue(now).is_empty());
        assert_eq!(queue.read_position(), cursor);
    }

    assert_eq!(queue.get_send_queue(1010), vec![1]);
}

#[test]
fn test_batches_are_shuffled() {
    let random = SecureRandomSource::with_parent(StdRng::seed_from_u64(99)).unwrap();
    let queue =
        RandomQueue::<u32>::with_random_source(QueueConfig::new(100, 10, 1000), random).unwrap();

    for i in 0..1000 {
        queue.add(2000, i, 2000).unwrap();
    }
    let batch = queue.get_send_queue(2000);
    assert_eq!(batch.len(), 1000);

    let in_order = batch.windows(2).filter(|pair| pair[0] < pair[1]).count();
    assert!(in_order < 900, "Batch looks unshuffled: {} ascending pairs", in_order);
}

#[test]
fn test_due_queue_after_polling_gap() {
    let queue = RandomQueue::<u64>::new(3600, 10, 3600).unwrap();
    for i in 0..600u64 {
        queue.add(3600 + i, i, 3600).unwrap();
    }

    let mut delivered = queue.get_due_queue(3600);
    // The reader sleeps for ten minutes, then catches up in one call.
    delivered.extend(queue.get_due_queue(4200));

    delivered.sort_unstable();
    assert_eq!(delivered, (0..600).collect::<Vec<_>>());
    assert!(queue.is_empty());
}

#[test]
fn test_concurrent_producers_and_reader() {
    let queue = Arc::new(RandomQueue::<u64>::new(600, 10, 6000).unwrap());
    let producers = 8u64;
    let per_producer = 500u64;

    std::thread::scope(|scope| {
        for producer in 0..producers {
            let queue = Arc::clone(&queue);
            scope.spawn(move || {
                for n in 0..per_producer {
                    let id = producer * per_producer + n;
                    queue.add(1000 + (id % 600), id, 1000).unwrap();
                }
            });
        }
    });
    assert_eq!(queue.len(), (producers * per_producer) as usize);

    let delivered: Vec<u64> = std::thread::scope(|scope| {
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                scope.spawn(move || {
                    let mut got = Vec::new();
                    for now in (1000..1600).step_by(10) {
                        got.extend(queue.get_due_queue(now));
                    }
                    got
                })
            })
            .collect();
        readers
            .into_iter()
            .flat_map(|reader| reader.join().unwrap())
            .collect()
    });

    let unique: HashSet<_> = delivered.iter().copied().collect();
    assert_eq!(delivered.len(), unique.len(), "Duplicate delivery");
    assert_eq!(unique.len(), (producers * per_producer) as usize);
}

#[test]
fn test_concurrent_send_queue_readers() {
    let queue = Arc::new(RandomQueue::<u64>::new(600, 10, 600).unwrap());
    for id in 0..600u64 {
        queue.add(1000 + (id % 60) * 10, id, 1000).unwrap();
    }
    assert!(queue.get_send_queue(990).is_empty());
    assert_eq!(queue.read_position(), Some(99));

    let mut delivered = Vec::new();
    for now in (1000..1600).step_by(10) {
        let batches: Vec<Vec<u64>> = std::thread::scope(|scope| {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    let queue = Arc::clone(&queue);
                    scope.spawn(move || queue.get_send_queue(now))
                })
                .collect();
            readers
                .into_iter()
                .map(|reader| reader.join().unwrap())
                .collect()
        });

        let served = batches.iter().filter(|batch| !batch.is_empty()).count();
        assert_eq!(served, 1, "Tick {} served {} times", now / 10, served);
        assert_eq!(queue.read_position(), Some(now / 10));
        delivered.extend(batches.into_iter().flatten());
    }

    let unique: HashSet<_> = delivered.iter().copied().collect();
    assert_eq!(delivered.len(), unique.len(), "Duplicate delivery");
    assert_eq!(unique.len(), 600);
    assert!(queue.is_empty());
}
