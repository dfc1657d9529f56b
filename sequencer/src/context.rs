//! Node-wide state with an explicit lifecycle.
//!
//! [`NodeContext`] owns the local identity, the transaction status cache and
//! the shutdown flag shared by every service thread. It is built once by
//! [`NodeContext::init`] and torn down by [`NodeContext::shutdown`]; nothing
//! in the crate reaches for it through a global.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::Result;
use slog::Logger;

use crate::{
    assembler::SlotOutcome,
    config::NodeConfig,
    crypto::{Hash, hash::short_hex, identity::NodeIdentity},
};

/// Final state of a transaction as seen by this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Included in the block committed for `slot`
    Committed { slot: u64, block_hash: Hash },
}

/// Bounded map from transaction id to outcome; the oldest entry is evicted first.
pub struct TxStatusCache {
    capacity: usize,
    inner: Mutex<StatusEntries>,
}

#[derive(Default)]
struct StatusEntries {
    by_id: HashMap<Hash, TxOutcome>,
    order: VecDeque<Hash>,
}

impl TxStatusCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(StatusEntries::default()),
        }
    }

    pub fn record(&self, id: Hash, outcome: TxOutcome) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.by_id.insert(id, outcome).is_none() {
            entries.order.push_back(id);
        }
        while entries.order.len() > self.capacity {
            if let Some(evicted) = entries.order.pop_front() {
                entries.by_id.remove(&evicted);
            }
        }
    }

    pub fn get(&self, id: &Hash) -> Option<TxOutcome> {
        let entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        entries.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        let entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        entries.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self) {
        let mut entries = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        entries.by_id.clear();
        entries.order.clear();
    }
}

pub struct NodeContext {
    identity: Arc<NodeIdentity>,
    status_cache: TxStatusCache,
    shutdown: Arc<AtomicBool>,
    logger: Logger,
}

impl NodeContext {
    /// Loads (or creates) the node identity and sets up the shared state.
    pub fn init(config: &NodeConfig, logger: Logger) -> Result<Self> {
        let identity = match &config.identity_path {
            Some(path) => NodeIdentity::load_or_generate(path)?,
            None => NodeIdentity::generate(),
        };
        slog::info!(
            logger,
            "Node context initialized";
            "public_key" => hex::encode(identity.public_key()),
            "persistent_identity" => config.identity_path.is_some(),
        );
        Ok(Self {
            identity: Arc::new(identity),
            status_cache: TxStatusCache::new(config.status_cache_capacity),
            shutdown: Arc::new(AtomicBool::new(false)),
            logger,
        })
    }

    pub fn identity(&self) -> Arc<NodeIdentity> {
        Arc::clone(&self.identity)
    }

    /// Shared flag every service thread polls.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn status_cache(&self) -> &TxStatusCache {
        &self.status_cache
    }

    pub fn tx_status(&self, id: &Hash) -> Option<TxOutcome> {
        self.status_cache.get(id)
    }

    /// Records the transactions of a committed slot in the status cache.
    pub fn observe_outcome(&self, outcome: &SlotOutcome) {
        if let SlotOutcome::Committed {
            slot,
            block_hash,
            tx_ids,
            ..
        } = outcome
        {
            for id in tx_ids {
                self.status_cache.record(
                    *id,
                    TxOutcome::Committed {
                        slot: *slot,
                        block_hash: *block_hash,
                    },
                );
            }
            slog::trace!(
                self.logger,
                "Recorded committed transactions";
                "slot" => slot,
                "block" => short_hex(block_hash),
                "count" => tx_ids.len(),
            );
        }
    }

    /// Raises the shutdown flag and drops cached state. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let cached = self.status_cache.len();
        self.status_cache.clear();
        slog::info!(self.logger, "Node context shut down"; "cached_statuses" => cached);
    }
}

impl Drop for NodeContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
