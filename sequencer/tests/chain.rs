mod common;

use std::sync::Arc;

use common::{memory_engine, transfer};
use rand::{Rng, SeedableRng, rngs::StdRng};
use sequencer::{
    crypto::ZERO_HASH,
    poh::{EventKind, PohEngine, VerifyError, next_hash},
    state::bloom::AccountConflictBloom,
};

#[test]
fn heights_and_counters_follow_the_append_sequence() {
    let engine = memory_engine();
    let empties: Vec<_> = (0..3).map(|_| engine.append_event(None).unwrap()).collect();
    assert_eq!(
        empties.iter().map(|r| r.chain_height).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(
        empties.iter().map(|r| r.empty_event_counter).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    let tx_bytes = [0xC0, 0xFF, 0xEE];
    let data = engine.append_event(Some(tx_bytes.as_slice())).unwrap();
    assert_eq!(data.chain_height, 4);
    assert_eq!(data.empty_event_counter, 0);
    assert_eq!(data.previous_hash, empties[2].current_hash);
    assert_eq!(
        data.current_hash,
        next_hash(&empties[2].current_hash, &data.event_digest, 0)
    );
    assert_eq!(empties[0].previous_hash, ZERO_HASH);
}

#[test]
fn any_flipped_bit_is_located() {
    let engine = memory_engine();
    let mut records = Vec::new();
    for round in 0..5u64 {
        records.push(engine.append_event(None).unwrap());
        let txs = vec![transfer(round * 2 + 1, 10), transfer(round * 2 + 2, 20)];
        records.extend(engine.batch_timestamp_transactions(&txs).unwrap());
        records.push(engine.append_block_event([round as u8 + 1; 32]).unwrap());
    }
    assert_eq!(PohEngine::verify_records(&records), Ok(()));

    let mut rng = StdRng::seed_from_u64(7);
    for position in 0..records.len() {
        let mut tampered = records.clone();
        let byte = rng.gen_range(0..32);
        let bit = 1u8 << rng.gen_range(0..8);
        tampered[position].current_hash[byte] ^= bit;
        let err = PohEngine::verify_records(&tampered).unwrap_err();
        assert_eq!(err.position(), position);
    }
}

#[test]
fn reordered_records_break_the_link() {
    let engine = memory_engine();
    let mut records: Vec<_> = (1..=4)
        .map(|seed| engine.timestamp_transaction(&transfer(seed, seed)).unwrap())
        .collect();
    records.swap(1, 2);
    assert_eq!(
        PohEngine::verify_records(&records),
        Err(VerifyError::BrokenLink { position: 1 })
    );
}

#[test]
fn batch_order_is_chain_order() {
    let engine = memory_engine();
    let txs: Vec<_> = (1..=6).map(|seed| Arc::new(transfer(seed, 100 - seed))).collect();
    let records = engine.batch_timestamp_transactions(&txs).unwrap();

    assert!(records.iter().all(|r| r.event_kind == EventKind::Transaction));
    let ids: Vec<_> = records.iter().filter_map(|r| r.event_id).collect();
    let expected: Vec<_> = txs.iter().map(|tx| tx.id).collect();
    assert_eq!(ids, expected);
    assert_eq!(engine.current_height(), 6);
}

#[test]
fn concurrent_appenders_build_one_chain() {
    let engine = memory_engine();
    let records = std::sync::Mutex::new(Vec::new());
    crossbeam::thread::scope(|s| {
        for worker in 0..4u64 {
            let engine = &engine;
            let records = &records;
            s.spawn(move |_| {
                for i in 0..100u64 {
                    let record = if i % 3 == 0 {
                        engine.append_event(None).unwrap()
                    } else {
                        engine
                            .timestamp_transaction(&transfer(worker * 1_000 + i + 1, i))
                            .unwrap()
                    };
                    records.lock().unwrap().push(record);
                }
            });
        }
    })
    .unwrap();

    let mut records = records.into_inner().unwrap();
    records.sort_by_key(|r| r.chain_height);
    assert_eq!(records.len(), 400);
    assert_eq!(records.last().unwrap().chain_height, 400);
    assert_eq!(PohEngine::verify_records(&records), Ok(()));
    assert_eq!(engine.current_hash(), records[399].current_hash);
}

#[test]
fn bloom_has_no_false_negatives() {
    let mut rng = StdRng::seed_from_u64(42);
    let keys: Vec<[u8; 32]> = (0..2_000).map(|_| rng.r#gen()).collect();

    let mut bloom = AccountConflictBloom::new();
    for key in &keys {
        bloom.add(key);
    }
    assert!(keys.iter().all(|key| bloom.might_contain(key)));

    let restored = AccountConflictBloom::from_bytes(bloom.as_bytes()).unwrap();
    assert!(keys.iter().all(|key| restored.might_contain(key)));

    let mut other = AccountConflictBloom::new();
    other.add(&keys[17]);
    assert!(bloom.may_conflict(&other));
}
