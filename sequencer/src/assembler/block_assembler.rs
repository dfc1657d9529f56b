//! Per-slot block assembly.
//!
//! ```text
//! Idle ─tick─► Collecting ─► Assembling ─► Submitted ─┬─► Committed
//!                  │              │                    └─► Rejected
//!                  └──────────────┴── error / panic ──────► Rejected
//! ```
//!
//! Every tick yields exactly one outcome. A rejected slot hands its
//! transactions back to the pool and never submits a partial block.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use slog::Logger;
use thiserror::Error;

use super::{
    clock::SlotTick,
    traits::{BlockProcessor, LatestBlockProvider, StateRootProvider},
};
use crate::{
    config::AssemblerConfig,
    crypto::hash::{self, Hash, ZERO_HASH, short_hex},
    mempool::TransactionPool,
    poh::{PohEngine, PohError},
    state::{
        block::{Block, BlockBody, BlockHeader},
        bloom::AccountConflictBloom,
        transaction::Transaction,
    },
};

/// Where the assembler is within the current slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Idle,
    Collecting,
    Assembling,
    Submitted,
    Committed,
    Rejected,
}

/// Why a slot produced no committed block.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Slot {slot} is not after last assembled slot {last}")]
    StaleSlot { slot: u64, last: u64 },

    #[error("Failed to read latest block: {0}")]
    LatestBlock(#[source] anyhow::Error),

    #[error("Failed to encode transaction: {0}")]
    Encoding(String),

    #[error("Failed to stamp transactions: {0}")]
    Chain(#[from] PohError),

    #[error("Assembled block for slot {slot} is malformed")]
    Malformed { slot: u64 },

    #[error("Block rejected: {0}")]
    Rejected(#[source] anyhow::Error),

    #[error("Assembly panicked: {0}")]
    Panicked(String),
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The block was accepted by the processor
    Committed {
        slot: u64,
        block_hash: Hash,
        tx_ids: Vec<Hash>,
        /// Transactions that did not fit and went back to the pool
        deferred: usize,
    },
    /// The slot was skipped; its transactions went back to the pool
    Rejected {
        slot: u64,
        requeued: usize,
        reason: String,
    },
    /// The tick was not newer than the last handled one
    Stale { slot: u64 },
}

impl SlotOutcome {
    pub fn slot(&self) -> u64 {
        match self {
            SlotOutcome::Committed { slot, .. }
            | SlotOutcome::Rejected { slot, .. }
            | SlotOutcome::Stale { slot } => *slot,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, SlotOutcome::Committed { .. })
    }
}

/// Running totals kept by the assembler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub committed: u64,
    pub rejected: u64,
    pub stale: u64,
    pub transactions_committed: u64,
    /// Transactions that could not be put back because their shard was full
    pub dropped: u64,
    /// Transactions discarded because they alone exceed `max_block_bytes`
    pub oversized: u64,
}

/// A block plus the pooled transactions it does not carry.
struct Assembled {
    block: Block,
    included: Vec<Arc<Transaction>>,
    deferred: Vec<Arc<Transaction>>,
    /// Transactions no block can ever carry
    oversized: Vec<Arc<Transaction>>,
}

/// Builds one candidate block per slot from the pool and the chain.
pub struct BlockAssembler {
    config: AssemblerConfig,
    pool: Arc<TransactionPool>,
    engine: Arc<PohEngine>,
    processor: Arc<dyn BlockProcessor>,
    latest: Arc<dyn LatestBlockProvider>,
    state_root: Option<Arc<dyn StateRootProvider>>,
    state: AssemblerState,
    last_slot: Option<u64>,
    stats: AssemblerStats,
    logger: Logger,
}

impl BlockAssembler {
    pub fn new(
        config: AssemblerConfig,
        pool: Arc<TransactionPool>,
        engine: Arc<PohEngine>,
        processor: Arc<dyn BlockProcessor>,
        latest: Arc<dyn LatestBlockProvider>,
        logger: Logger,
    ) -> Self {
        Self {
            config,
            pool,
            engine,
            processor,
            latest,
            state_root: None,
            state: AssemblerState::Idle,
            last_slot: None,
            stats: AssemblerStats::default(),
            logger,
        }
    }

    /// Attaches the execution layer's state root; without one headers carry zeros.
    pub fn with_state_root(mut self, provider: Arc<dyn StateRootProvider>) -> Self {
        self.state_root = Some(provider);
        self
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    pub fn last_slot(&self) -> Option<u64> {
        self.last_slot
    }

    /// Runs one slot: pull, stamp, assemble, submit.
    ///
    /// Never panics and never returns an error; failures become
    /// [`SlotOutcome::Rejected`].
    pub fn on_slot(&mut self, tick: SlotTick) -> SlotOutcome {
        let slot = tick.slot;
        if let Some(last) = self.last_slot
            && slot <= last
        {
            self.stats.stale += 1;
            let err = AssemblyError::StaleSlot { slot, last };
            slog::debug!(self.logger, "Skipping stale slot tick"; "error" => %err);
            return SlotOutcome::Stale { slot };
        }
        self.last_slot = Some(slot);

        self.state = AssemblerState::Collecting;
        if let Err(e) = self.engine.enter_slot(slot) {
            return self.reject(slot, Vec::new(), AssemblyError::Chain(e));
        }
        let pulled = self
            .pool
            .select_and_remove_top_transactions(self.config.max_tx_per_block);

        self.state = AssemblerState::Assembling;
        let assembled =
            match panic::catch_unwind(AssertUnwindSafe(|| self.assemble(slot, &pulled))) {
                Ok(Ok(assembled)) => assembled,
                Ok(Err(e)) => return self.reject(slot, pulled, e),
                Err(payload) => {
                    return self.reject(slot, pulled, AssemblyError::Panicked(panic_message(&*payload)));
                }
            };
        let Assembled {
            block,
            included,
            deferred,
            oversized,
        } = assembled;

        if !oversized.is_empty() {
            self.stats.oversized += oversized.len() as u64;
            slog::warn!(
                self.logger,
                "Discarding transactions larger than a block";
                "slot" => slot,
                "count" => oversized.len(),
                "first" => short_hex(&oversized[0].id),
                "max_block_bytes" => self.config.max_block_bytes,
            );
        }

        let deferred_count = deferred.len();
        if !deferred.is_empty() {
            slog::debug!(
                self.logger,
                "Deferring transactions over the block size limit";
                "slot" => slot,
                "count" => deferred_count,
            );
            self.return_to_pool(deferred);
        }

        self.state = AssemblerState::Submitted;
        let submitted = panic::catch_unwind(AssertUnwindSafe(|| self.processor.process_block(&block)));
        match submitted {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return self.reject(slot, included, AssemblyError::Rejected(e)),
            Err(payload) => {
                return self.reject(slot, included, AssemblyError::Panicked(panic_message(&*payload)));
            }
        }

        self.state = AssemblerState::Committed;
        let block_hash = block.hash();
        if let Err(e) = self.engine.append_block_event(block_hash) {
            // The block is already committed downstream; only the marker is missing.
            slog::error!(
                self.logger,
                "Failed to append block event";
                "slot" => slot,
                "block" => short_hex(&block_hash),
                "error" => %e,
            );
        }

        self.stats.committed += 1;
        self.stats.transactions_committed += included.len() as u64;
        slog::info!(
            self.logger,
            "Block committed";
            "slot" => slot,
            "block" => short_hex(&block_hash),
            "tx_count" => block.header.tx_count,
            "chain_height" => block.header.chain_height,
            "pool_size" => self.pool.pool_size(),
        );

        SlotOutcome::Committed {
            slot,
            block_hash,
            tx_ids: included.iter().map(|tx| tx.id).collect(),
            deferred: deferred_count,
        }
    }

    fn assemble(&self, slot: u64, pulled: &[Arc<Transaction>]) -> Result<Assembled, AssemblyError> {
        let (parent_hash, parent_slot) = match self
            .latest
            .latest_block()
            .map_err(AssemblyError::LatestBlock)?
        {
            Some(parent) => (parent.hash(), parent.slot()),
            None => (ZERO_HASH, 0),
        };

        // Fill up to the size limit in selection order; the rest is deferred.
        let mut included = Vec::with_capacity(pulled.len());
        let mut deferred = Vec::new();
        let mut oversized = Vec::new();
        let mut transaction_hashes = Vec::with_capacity(pulled.len());
        let mut total_size = 0u64;
        for tx in pulled {
            let bytes = tx
                .canonical_bytes()
                .map_err(|e| AssemblyError::Encoding(e.to_string()))?;
            let size = bytes.len() as u64;
            if size > self.config.max_block_bytes {
                oversized.push(Arc::clone(tx));
                continue;
            }
            if total_size + size > self.config.max_block_bytes {
                deferred.push(Arc::clone(tx));
                continue;
            }
            total_size += size;
            transaction_hashes.push(hash::hash(&bytes));
            included.push(Arc::clone(tx));
        }

        let records = self.engine.batch_timestamp_transactions(&included)?;
        let (chain_hash, chain_height) = match records.last() {
            Some(last) => (last.current_hash, last.chain_height),
            None => {
                let head = self.engine.head();
                (head.current_hash, head.height)
            }
        };

        let mut bloom = AccountConflictBloom::new();
        for tx in &included {
            for key in tx.writable_keys() {
                bloom.add(key);
            }
        }

        let header = BlockHeader {
            parent_hash,
            state_root: self
                .state_root
                .as_ref()
                .map_or(ZERO_HASH, |provider| provider.state_root()),
            chain_hash,
            chain_height,
            slot,
            parent_slot,
            tx_count: included.len() as u64,
            fee_rule_hash: self.config.fee_rule.rule_hash(),
        };
        let body = BlockBody {
            transactions: included.iter().map(|tx| Transaction::clone(tx)).collect(),
            transaction_hashes,
            total_size,
            account_conflict_bloom: bloom,
        };
        let block = Block::new(header, body);
        if !block.is_well_formed(self.config.max_block_bytes) {
            return Err(AssemblyError::Malformed { slot });
        }

        Ok(Assembled {
            block,
            included,
            deferred,
            oversized,
        })
    }

    fn reject(&mut self, slot: u64, txs: Vec<Arc<Transaction>>, error: AssemblyError) -> SlotOutcome {
        self.state = AssemblerState::Rejected;
        self.stats.rejected += 1;
        let requeued = txs.len();
        self.return_to_pool(txs);
        slog::warn!(
            self.logger,
            "Slot rejected";
            "slot" => slot,
            "requeued" => requeued,
            "error" => %error,
        );
        SlotOutcome::Rejected {
            slot,
            requeued,
            reason: error.to_string(),
        }
    }

    fn return_to_pool(&mut self, txs: Vec<Arc<Transaction>>) {
        let dropped = self.pool.requeue(txs);
        if !dropped.is_empty() {
            self.stats.dropped += dropped.len() as u64;
            slog::error!(
                self.logger,
                "Pool full, transactions could not be requeued";
                "count" => dropped.len(),
                "first" => short_hex(&dropped[0].id),
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
