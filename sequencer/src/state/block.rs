use rkyv::{Archive, Deserialize, Serialize};

use crate::{
    crypto::hash::{self, Hash},
    state::{bloom::AccountConflictBloom, transaction::Transaction},
};

/// [`BlockHeader`] binds a block to its parent, to the chain position at
/// which its transactions were stamped, and to the fee rule in force.
#[derive(Archive, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// The hash of the parent block
    pub parent_hash: Hash,
    /// The state root reported by the execution layer when the block was built
    pub state_root: Hash,
    /// The chain hash after the block's transactions were stamped
    pub chain_hash: Hash,
    /// The chain height matching `chain_hash`
    pub chain_height: u64,
    /// The slot this block was produced for
    pub slot: u64,
    /// The slot of the parent block
    pub parent_slot: u64,
    /// Number of transactions in the body
    pub tx_count: u64,
    /// Hash of the fee rule used to price the transactions
    pub fee_rule_hash: Hash,
}

impl BlockHeader {
    /// Hash over every header field, in declaration order.
    pub fn compute_hash(&self) -> Hash {
        hash::hashv(&[
            self.parent_hash.as_slice(),
            self.state_root.as_slice(),
            self.chain_hash.as_slice(),
            &self.chain_height.to_le_bytes(),
            &self.slot.to_le_bytes(),
            &self.parent_slot.to_le_bytes(),
            &self.tx_count.to_le_bytes(),
            self.fee_rule_hash.as_slice(),
        ])
    }
}

/// [`BlockBody`] carries the ordered transactions and the summaries derived from them.
#[derive(Archive, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockBody {
    /// The transactions, in chain order
    pub transactions: Vec<Transaction>,
    /// Content hash of each transaction, aligned with `transactions`
    pub transaction_hashes: Vec<Hash>,
    /// Sum of the canonical encoding sizes of all transactions
    pub total_size: u64,
    /// Writable accounts touched by any transaction
    pub account_conflict_bloom: AccountConflictBloom,
}

impl BlockBody {
    pub fn empty() -> Self {
        Self {
            transactions: Vec::new(),
            transaction_hashes: Vec::new(),
            total_size: 0,
            account_conflict_bloom: AccountConflictBloom::new(),
        }
    }
}

/// [`Block`] is a candidate block assembled for one slot.
#[derive(Archive, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// The header of the block
    pub header: BlockHeader,
    /// The body of the block
    pub body: BlockBody,
}

impl Block {
    pub fn new(header: BlockHeader, body: BlockBody) -> Self {
        Self { header, body }
    }

    /// Returns the hash of the block. Headers commit to the chain hash, which in
    /// turn commits to every stamped transaction, so hashing the header suffices.
    #[inline]
    pub fn hash(&self) -> Hash {
        self.header.compute_hash()
    }

    /// Returns the slot of the block
    #[inline]
    pub fn slot(&self) -> u64 {
        self.header.slot
    }

    /// Returns the number of transactions in the body
    #[inline]
    pub fn len(&self) -> usize {
        self.body.transactions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.transactions.is_empty()
    }

    /// Checks the structural invariants every assembled block must satisfy.
    pub fn is_well_formed(&self, max_block_bytes: u64) -> bool {
        self.header.tx_count as usize == self.body.transactions.len()
            && self.body.transaction_hashes.len() == self.body.transactions.len()
            && self.body.total_size <= max_block_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::ZERO_HASH;

    fn header(slot: u64) -> BlockHeader {
        BlockHeader {
            parent_hash: ZERO_HASH,
            state_root: [1u8; 32],
            chain_hash: [2u8; 32],
            chain_height: 10,
            slot,
            parent_slot: slot.saturating_sub(1),
            tx_count: 0,
            fee_rule_hash: [3u8; 32],
        }
    }

    #[test]
    fn hash_changes_with_every_header_field() {
        let base = header(5);
        let mut other = base.clone();
        other.chain_height += 1;
        assert_ne!(base.compute_hash(), other.compute_hash());

        let mut other = base.clone();
        other.parent_slot = 0;
        assert_ne!(base.compute_hash(), other.compute_hash());
    }

    #[test]
    fn empty_block_is_well_formed() {
        let block = Block::new(header(1), BlockBody::empty());
        assert!(block.is_empty());
        assert!(block.is_well_formed(0));
        assert_eq!(block.slot(), 1);
    }

    #[test]
    fn tx_count_mismatch_is_not_well_formed() {
        let mut h = header(1);
        h.tx_count = 1;
        let block = Block::new(h, BlockBody::empty());
        assert!(!block.is_well_formed(1024));
    }
}
