//! Transaction Pool - Sharded Ring Buffers with Top-K Selection
//!
//! ## Features
//!
//! - **Sharded admission**: `shard = id mod N`, each shard a fixed-capacity ring
//! - **Lock-free reservation**: producers claim a ring position with a CAS on the
//!   shard's tail; only the slot write itself takes the shard lock
//! - **Top-k selection**: per-shard bounded min-heaps merged into a global one
//! - **Lazy reclamation**: selected entries are tombstoned in place and freed
//!   when the shard's head cursor passes them
//! - **Zero-copy hand-off**: entries hold `Arc<Transaction>`
//!
//! ## Time Complexity
//!
//! | Operation                             | Complexity           |
//! |---------------------------------------|----------------------|
//! | `add_transaction`                     | O(1)                 |
//! | `select_and_remove_top_transactions`  | O(N · C · log k)     |
//! | `remove_transactions`                 | O(N · C)             |
//!
//! Where N = shard count, C = shard capacity, k = requested count.
//!
//! ## Thread Safety
//!
//! `TransactionPool` is `Sync`. Any number of producers may add concurrently;
//! they only contend with each other inside the same shard. Selection and
//! explicit removal are serialized against each other, and each one blocks a
//! shard's producers only while it scans that shard.
//!
//! ## Duplicates
//!
//! Two transactions with the same id are kept as independent entries.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use super::{
    shard::Shard,
    types::{Candidate, PoolStats, SubmitError},
};
use crate::{
    config::{ConfigError, PoolConfig},
    crypto::Hash,
    state::transaction::{Transaction, TxStatus},
    validation::{self, TxValidationError},
};

/// Sharded, fixed-capacity transaction pool.
pub struct TransactionPool {
    shards: Vec<Shard>,
    shard_capacity: usize,
    /// Pool-wide admission counter, the FIFO tie-breaker for equal fees
    next_arrival: AtomicU64,
    /// Serializes selection and removal
    select_lock: Mutex<()>,
    stats_admitted: AtomicU64,
    stats_rejected: AtomicU64,
    stats_selected: AtomicU64,
    stats_removed: AtomicU64,
}

impl TransactionPool {
    /// Creates a pool from validated settings.
    pub fn new(config: &PoolConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            shards: (0..config.shard_count)
                .map(|index| Shard::new(index, config.shard_capacity))
                .collect(),
            shard_capacity: config.shard_capacity,
            next_arrival: AtomicU64::new(0),
            select_lock: Mutex::new(()),
            stats_admitted: AtomicU64::new(0),
            stats_rejected: AtomicU64::new(0),
            stats_selected: AtomicU64::new(0),
            stats_removed: AtomicU64::new(0),
        })
    }

    /// Creates a pool with `shard_count` shards of `shard_capacity` slots each.
    pub fn with_shards(shard_count: usize, shard_capacity: usize) -> Result<Self, ConfigError> {
        Self::new(&PoolConfig {
            shard_count,
            shard_capacity,
        })
    }

    /// The shard a transaction id routes to.
    ///
    /// Ids are hashes already, so their low bytes are uniformly distributed.
    pub fn shard_for(&self, id: &Hash) -> usize {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&id[..8]);
        (u64::from_le_bytes(prefix) % self.shards.len() as u64) as usize
    }

    /// Adds an already validated transaction.
    ///
    /// Returns `false` if the target shard is full. That is local
    /// back-pressure: nothing is evicted and retrying is up to the caller.
    pub fn add_transaction(&self, tx: Arc<Transaction>) -> bool {
        let shard = self.shard_for(&tx.id);
        let arrival = self.next_arrival.fetch_add(1, Ordering::Relaxed);
        if self.shards[shard].push(tx, arrival) {
            self.stats_admitted.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            self.stats_rejected.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Validates and admits a transaction from the submission path.
    pub fn submit(&self, mut tx: Transaction) -> Result<Arc<Transaction>, SubmitError> {
        validation::validate_transaction(&tx)?;
        tx.status.insert(TxStatus::VALIDATED | TxStatus::POOLED);
        let tx = Arc::new(tx);
        if self.add_transaction(Arc::clone(&tx)) {
            Ok(tx)
        } else {
            Err(SubmitError::ShardFull {
                shard: self.shard_for(&tx.id),
            })
        }
    }

    /// Removes and returns the `k` live entries with the highest fee.
    ///
    /// Equal fees are ordered by arrival, earliest first. The result is
    /// ordered best first. An entry returned here is tombstoned and can never
    /// be returned again.
    pub fn select_and_remove_top_transactions(&self, k: usize) -> Vec<Arc<Transaction>> {
        if k == 0 {
            return Vec::new();
        }
        let _selecting = self.select_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Every global winner is in its own shard's local top-k.
        let mut global: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);
        for shard in &self.shards {
            for candidate in shard.top_candidates(k) {
                if global.len() < k {
                    global.push(Reverse(candidate));
                } else if global.peek().is_some_and(|Reverse(worst)| candidate > *worst) {
                    global.pop();
                    global.push(Reverse(candidate));
                } else {
                    // Local lists are sorted; the rest of this shard is worse.
                    break;
                }
            }
        }

        let mut winners: Vec<Candidate> = global.into_iter().map(|Reverse(c)| c).collect();
        winners.sort_unstable_by(|a, b| b.cmp(a));

        let mut by_shard: Vec<Vec<u64>> = vec![Vec::new(); self.shards.len()];
        for winner in &winners {
            by_shard[winner.shard].push(winner.position);
        }
        let mut tombstoned = 0;
        for (shard, positions) in self.shards.iter().zip(&by_shard) {
            if !positions.is_empty() {
                tombstoned += shard.tombstone_positions(positions);
            }
        }
        debug_assert_eq!(tombstoned, winners.len());

        self.stats_selected
            .fetch_add(winners.len() as u64, Ordering::Relaxed);
        winners.into_iter().map(|c| c.tx).collect()
    }

    /// Tombstones every live entry whose id is in `ids`.
    ///
    /// Used when another producer's block already included them. Returns the
    /// number of entries removed, duplicates included.
    pub fn remove_transactions(&self, ids: &[Hash]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let _selecting = self.select_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let ids: HashSet<Hash> = ids.iter().copied().collect();
        let removed: usize = self.shards.iter().map(|s| s.tombstone_ids(&ids)).sum();
        self.stats_removed.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Returns previously selected transactions to the pool.
    ///
    /// Requeued entries get a fresh arrival, so they queue behind entries of
    /// equal fee that arrived meanwhile. Returns the transactions that did not
    /// fit back in.
    pub fn requeue<I>(&self, txs: I) -> Vec<Arc<Transaction>>
    where
        I: IntoIterator<Item = Arc<Transaction>>,
    {
        txs.into_iter()
            .filter(|tx| !self.add_transaction(Arc::clone(tx)))
            .collect()
    }

    /// Number of live entries across all shards.
    pub fn pool_size(&self) -> usize {
        self.shards.iter().map(Shard::live).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pool_size() == 0
    }

    /// Upper bound on live entries.
    pub fn capacity(&self) -> usize {
        self.shards.len() * self.shard_capacity
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Structural checks only; no chain state is consulted.
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), TxValidationError> {
        validation::validate_transaction(tx)
    }

    /// Returns pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            shard_count: self.shards.len(),
            capacity: self.capacity(),
            live: self.pool_size(),
            admitted: self.stats_admitted.load(Ordering::Relaxed),
            rejected: self.stats_rejected.load(Ordering::Relaxed),
            selected: self.stats_selected.load(Ordering::Relaxed),
            removed: self.stats_removed.load(Ordering::Relaxed),
        }
    }
}
