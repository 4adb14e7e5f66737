//! Concurrent readers, single writer (testable property 5).
//!
//! Many threads call `lookup` in a loop while one thread randomly inserts
//! and removes rules, with a quiescence barrier between each writer step so
//! every reader thread observes a mix of pre- and post-change state without
//! ever panicking, deadlocking, or returning a stale `Arc` pointing at a
//! reclaimed rule.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rand::Rng;

use dpcls::{Classifier, FlowKey, Miniflow};

fn key(block: usize, value: u64) -> FlowKey {
    FlowKey::new(Miniflow::from_blocks([(block, value)]))
}

#[test]
fn test_concurrent_readers_survive_interleaved_writer() {
    let classifier = Arc::new(Classifier::default());
    let mask = key(0, u64::MAX);

    // Seed a handful of rules so readers have something to hit from the start.
    let mut installed = Vec::new();
    for v in 0..8u64 {
        installed.push(classifier.insert(mask.clone(), key(0, v)).unwrap());
    }

    let stop = Arc::new(AtomicBool::new(false));
    let readers = 4;
    let barrier = Arc::new(Barrier::new(readers + 1));

    let mut handles = Vec::new();
    for _ in 0..readers {
        let classifier = classifier.clone();
        let stop = stop.clone();
        let barrier = barrier.clone();
        handles.push(thread::spawn(move || {
            barrier.wait();
            while !stop.load(Ordering::Relaxed) {
                for v in 0..8u64 {
                    let packet = key(0, v);
                    let mut out = vec![None];
                    // Never panics, never blocks on the writer mutex.
                    let _ = classifier.lookup(&[&packet], &mut out);
                    if let Some(rule) = &out[0] {
                        // A returned Arc must point at a live, readable rule.
                        assert_eq!(rule.flow().miniflow().get(0), Some(v));
                    }
                }
            }
        }));
    }

    let writer = {
        let classifier = classifier.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            let mut rng = rand::thread_rng();
            for _ in 0..50u64 {
                let v = rng.gen_range(0..8u64);
                // Remove and immediately reinsert to churn structure under readers.
                if let Some(pos) = installed.iter().position(|r| {
                    r.flow().miniflow().get(0) == Some(v)
                }) {
                    let rule = installed.remove(pos);
                    classifier.remove(&rule);
                    let reinserted = classifier.insert(mask.clone(), key(0, v)).unwrap();
                    installed.push(reinserted);
                }
            }
        })
    };

    writer.join().unwrap();
    stop.store(true, Ordering::Relaxed);
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(classifier.subtable_count(), 1);
    assert_eq!(classifier.rule_count(), 8);
}
