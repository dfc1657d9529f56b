use rkyv::{Archive, Deserialize, Serialize};

use crate::{
    crypto::hash::{self, Hash, ZERO_HASH},
    poh::error::VerifyError,
};

/// What a chain record timestamps.
#[derive(Archive, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// A heartbeat tick with no payload
    Empty,
    /// A transaction; the event id is the transaction id
    Transaction,
    /// A committed block; the event id is the block hash
    Block,
    /// Arbitrary node-level data
    System,
}

/// [`ChainRecord`] is one link of the hash chain.
///
/// Created only by the engine and never mutated afterwards.
#[derive(Archive, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ChainRecord {
    /// The hash this record extends
    pub previous_hash: Hash,
    /// Digest of the event payload, zero for empty events
    pub event_digest: Hash,
    /// `H(previous_hash ‖ event_digest ‖ empty_event_counter as big-endian u64)`
    pub current_hash: Hash,
    /// Consecutive empty events ending at this record, zero for non-empty ones
    pub empty_event_counter: u64,
    /// What was timestamped
    pub event_kind: EventKind,
    /// Position in the chain, starting at 1 for the first appended record
    pub chain_height: u64,
    /// The slot the engine was in when the record was appended
    pub slot: u64,
    /// Transaction id or block hash, depending on `event_kind`
    pub event_id: Option<Hash>,
    /// Producer signature over `current_hash`, when a signer is configured
    pub producer_signature: Option<Vec<u8>>,
}

impl ChainRecord {
    #[inline]
    pub fn is_empty_event(&self) -> bool {
        self.event_kind == EventKind::Empty
    }
}

/// Computes the next chain hash.
#[inline]
pub fn next_hash(previous_hash: &Hash, event_digest: &Hash, empty_event_counter: u64) -> Hash {
    hash::hashv(&[
        previous_hash.as_slice(),
        event_digest.as_slice(),
        &empty_event_counter.to_be_bytes(),
    ])
}

/// Replays `records` forward from the first record's `previous_hash`.
///
/// Returns the first position whose stored data disagrees with the replay.
/// An empty slice verifies trivially.
pub fn verify_records(records: &[ChainRecord]) -> Result<(), VerifyError> {
    let mut expected_previous: Option<Hash> = None;
    let mut prior: Option<&ChainRecord> = None;

    for (position, record) in records.iter().enumerate() {
        let previous = match expected_previous {
            Some(expected) if expected != record.previous_hash => {
                return Err(VerifyError::BrokenLink { position });
            }
            Some(expected) => expected,
            None => record.previous_hash,
        };

        // Fields come from untrusted input; overflow is a mismatch, not a panic.
        if let Some(prior) = prior
            && prior.chain_height.checked_add(1) != Some(record.chain_height)
        {
            return Err(VerifyError::HeightGap {
                position,
                expected: prior.chain_height.saturating_add(1),
                found: record.chain_height,
            });
        }

        if record.is_empty_event() {
            if record.event_digest != ZERO_HASH {
                return Err(VerifyError::NonEmptyDigest { position });
            }
            let counter_ok = match prior {
                Some(prior) => {
                    prior.empty_event_counter.checked_add(1) == Some(record.empty_event_counter)
                }
                None => record.empty_event_counter >= 1,
            };
            if !counter_ok {
                return Err(VerifyError::CounterMismatch {
                    position,
                    found: record.empty_event_counter,
                });
            }
        } else if record.empty_event_counter != 0 {
            return Err(VerifyError::CounterMismatch {
                position,
                found: record.empty_event_counter,
            });
        }

        let recomputed = next_hash(&previous, &record.event_digest, record.empty_event_counter);
        if recomputed != record.current_hash {
            return Err(VerifyError::HashMismatch { position });
        }

        expected_previous = Some(recomputed);
        prior = Some(record);
    }

    Ok(())
}
