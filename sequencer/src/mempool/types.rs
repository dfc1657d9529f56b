//! Mempool type definitions.

use std::{cmp::Ordering, sync::Arc};

use thiserror::Error;

use crate::{state::transaction::Transaction, validation::TxValidationError};

/// A transaction stored in a shard's ring buffer.
#[derive(Debug, Clone)]
pub struct PooledEntry {
    /// The admitted transaction
    pub tx: Arc<Transaction>,
    /// Pool-wide admission sequence, used as the FIFO tie-breaker
    pub arrival: u64,
    /// Ring position the entry was written at
    pub position: u64,
    /// Set once the entry has been selected or removed
    pub tombstoned: bool,
}

impl PooledEntry {
    pub fn new(tx: Arc<Transaction>, arrival: u64, position: u64) -> Self {
        Self {
            tx,
            arrival,
            position,
            tombstoned: false,
        }
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        !self.tombstoned
    }
}

/// Selection candidate copied out of a shard.
///
/// Ordered so that "greater" means "selected first": higher fee wins, and for
/// equal fees the earlier arrival wins.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub fee: u64,
    pub arrival: u64,
    pub shard: usize,
    pub position: u64,
    pub tx: Arc<Transaction>,
}

impl Candidate {
    pub(crate) fn from_entry(shard: usize, entry: &PooledEntry) -> Self {
        Self {
            fee: entry.tx.fee,
            arrival: entry.arrival,
            shard,
            position: entry.position,
            tx: Arc::clone(&entry.tx),
        }
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fee
            .cmp(&other.fee)
            .then_with(|| other.arrival.cmp(&self.arrival))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Why a submitted transaction was not admitted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Invalid transaction: {0}")]
    Invalid(#[from] TxValidationError),

    /// Local back-pressure; the caller may retry later
    #[error("Shard {shard} is full")]
    ShardFull { shard: usize },
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of shards
    pub shard_count: usize,
    /// Upper bound on live entries
    pub capacity: usize,
    /// Live (non-tombstoned) entries
    pub live: usize,
    /// Transactions accepted into a shard, requeues included
    pub admitted: u64,
    /// Admission attempts refused because the shard was full
    pub rejected: u64,
    /// Entries handed out by selection
    pub selected: u64,
    /// Entries tombstoned by explicit removal
    pub removed: u64,
}
