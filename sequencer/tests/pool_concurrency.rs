mod common;

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use common::transfer;
use sequencer::mempool::{SubmitError, TransactionPool};

const PRODUCERS: u64 = 4;
const PER_PRODUCER: u64 = 500;

#[test]
fn concurrent_submit_and_select_keeps_accounting() {
    let pool = TransactionPool::with_shards(4, 128).unwrap();
    let accepted = AtomicU64::new(0);
    let full = AtomicU64::new(0);
    let producers_done = AtomicUsize::new(0);
    let selected = Mutex::new(Vec::new());

    crossbeam::thread::scope(|s| {
        for producer in 0..PRODUCERS {
            let pool = &pool;
            let accepted = &accepted;
            let full = &full;
            let producers_done = &producers_done;
            s.spawn(move |_| {
                for i in 0..PER_PRODUCER {
                    let seed = producer * PER_PRODUCER + i + 1;
                    match pool.submit(transfer(seed, seed % 97)) {
                        Ok(_) => accepted.fetch_add(1, Ordering::Relaxed),
                        Err(SubmitError::ShardFull { .. }) => full.fetch_add(1, Ordering::Relaxed),
                        Err(e) => panic!("unexpected rejection: {e}"),
                    };
                }
                producers_done.fetch_add(1, Ordering::Release);
            });
        }

        let pool = &pool;
        let selected = &selected;
        let producers_done = &producers_done;
        s.spawn(move |_| {
            while producers_done.load(Ordering::Acquire) < PRODUCERS as usize {
                let batch = pool.select_and_remove_top_transactions(16);
                selected.lock().unwrap().extend(batch);
                std::thread::yield_now();
            }
        });
    })
    .unwrap();

    let selected = selected.into_inner().unwrap();
    let accepted = accepted.into_inner();
    let full = full.into_inner();

    assert_eq!(accepted + full, PRODUCERS * PER_PRODUCER);
    assert_eq!(selected.len() as u64 + pool.pool_size() as u64, accepted);
    assert!(pool.pool_size() <= pool.capacity());

    let unique: HashSet<_> = selected.iter().map(|tx| tx.id).collect();
    assert_eq!(unique.len(), selected.len(), "a transaction was selected twice");

    let stats = pool.stats();
    assert_eq!(stats.admitted, accepted);
    assert_eq!(stats.rejected, full);
    assert_eq!(stats.selected, selected.len() as u64);

    let rest = pool.select_and_remove_top_transactions(pool.capacity());
    assert!(rest.iter().all(|tx| !unique.contains(&tx.id)));
    assert!(pool.is_empty());
}

#[test]
fn concurrent_selectors_never_share_a_transaction() {
    let pool = Arc::new(TransactionPool::with_shards(8, 64).unwrap());
    for seed in 1..=400 {
        assert!(pool.add_transaction(Arc::new(transfer(seed, seed))));
    }

    let seen = Mutex::new(HashSet::new());
    crossbeam::thread::scope(|s| {
        for _ in 0..4 {
            let pool = &pool;
            let seen = &seen;
            s.spawn(move |_| {
                loop {
                    let batch = pool.select_and_remove_top_transactions(7);
                    if batch.is_empty() {
                        break;
                    }
                    let mut seen = seen.lock().unwrap();
                    for tx in batch {
                        assert!(seen.insert(tx.id));
                    }
                }
            });
        }
    })
    .unwrap();

    assert_eq!(seen.into_inner().unwrap().len(), 400);
    assert!(pool.is_empty());
}

#[test]
fn highest_fees_come_out_first() {
    let pool = TransactionPool::with_shards(4, 16).unwrap();
    for (seed, fee) in [10, 50, 30, 5, 90].into_iter().enumerate() {
        pool.submit(transfer(seed as u64 + 1, fee)).unwrap();
    }

    let first: Vec<u64> = pool
        .select_and_remove_top_transactions(3)
        .iter()
        .map(|tx| tx.fee)
        .collect();
    assert_eq!(first, vec![90, 50, 30]);
    assert_eq!(pool.pool_size(), 2);

    let second: Vec<u64> = pool
        .select_and_remove_top_transactions(3)
        .iter()
        .map(|tx| tx.fee)
        .collect();
    assert_eq!(second, vec![10, 5]);
    assert!(pool.select_and_remove_top_transactions(3).is_empty());
}

#[test]
fn full_shard_pushes_back_until_head_is_removed() {
    let pool = TransactionPool::with_shards(1, 4).unwrap();
    for (seed, fee) in [50, 40, 30, 20].into_iter().enumerate() {
        assert!(pool.add_transaction(Arc::new(transfer(seed as u64 + 1, fee))));
    }
    assert!(matches!(
        pool.submit(transfer(99, 1_000)),
        Err(SubmitError::ShardFull { shard: 0 })
    ));
    assert_eq!(pool.pool_size(), 4);

    // The two oldest entries carry the best fees, so removing them frees the head.
    let taken = pool.select_and_remove_top_transactions(2);
    assert_eq!(taken.len(), 2);
    assert!(pool.submit(transfer(100, 1)).is_ok());
    assert!(pool.submit(transfer(101, 1)).is_ok());
    assert!(pool.submit(transfer(102, 1)).is_err());
    assert_eq!(pool.pool_size(), 4);
}
