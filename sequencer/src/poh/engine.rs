//! The hash-chain engine.
//!
//! ## Concurrency
//!
//! Chain extension is a single critical section: each append's input is the
//! previous append's output, so the engine keeps its cursor behind one mutex.
//! After every successful append (or batch) the new head is published through
//! an [`ArcSwap`], giving readers a wait-free consistent snapshot that never
//! exposes a half-written cursor.
//!
//! ## Failures
//!
//! - Fatal errors (encoding fault, counter overflow, poisoned writer) set the
//!   halted flag; the chain never skips a height to recover from them.
//! - Every `checkpoint_interval` heights, and on every block event, the record
//!   is persisted as a checkpoint before the cursor moves. Heights cited by a
//!   committed block are therefore never handed out again after a restart.
//! - A due checkpoint that cannot be persisted is retried with exponential
//!   backoff. If every attempt fails, the append is abandoned and the cursor
//!   is left exactly where it was.

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use arc_swap::ArcSwap;
use slog::Logger;

use crate::{
    config::PohConfig,
    crypto::{
        hash::{self, Hash, ZERO_HASH, short_hex},
        signer::RecordSigner,
    },
    poh::{
        checkpoint::ChainCheckpointStore,
        error::{PohError, VerifyError},
        record::{self, ChainRecord, EventKind},
    },
    state::transaction::Transaction,
};

/// Published view of the chain tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHead {
    /// Hash of the latest record (the genesis hash before the first append)
    pub current_hash: Hash,
    /// Height of the latest record (0 before the first append)
    pub height: u64,
    /// Consecutive empty events ending at the tip
    pub empty_event_counter: u64,
    /// The slot new records are stamped with
    pub slot: u64,
}

impl ChainHead {
    fn genesis(genesis_hash: Hash) -> Self {
        Self {
            current_hash: genesis_hash,
            height: 0,
            empty_event_counter: 0,
            slot: 0,
        }
    }

    fn from_record(record: &ChainRecord) -> Self {
        Self {
            current_hash: record.current_hash,
            height: record.chain_height,
            empty_event_counter: record.empty_event_counter,
            slot: record.slot,
        }
    }
}

/// Writer-side state, only touched while holding the cursor lock.
struct ChainCursor {
    head: ChainHead,
    halted: bool,
}

/// An event waiting to be appended, with its digest already computed.
struct PendingEvent {
    kind: EventKind,
    digest: Hash,
    event_id: Option<Hash>,
}

/// [`PohEngine`] owns the node's single Proof-of-History chain.
pub struct PohEngine {
    config: PohConfig,
    cursor: Mutex<ChainCursor>,
    published: ArcSwap<ChainHead>,
    store: Option<Arc<dyn ChainCheckpointStore>>,
    signer: Option<Arc<dyn RecordSigner>>,
    logger: Logger,
}

impl PohEngine {
    /// Creates an engine whose first record extends `genesis_hash`.
    pub fn new(config: PohConfig, genesis_hash: Hash, logger: Logger) -> Result<Self, PohError> {
        config
            .validate()
            .map_err(|e| PohError::InvalidConfig(e.to_string()))?;
        Ok(Self::from_head(config, ChainHead::genesis(genesis_hash), logger))
    }

    /// Rebuilds an engine from the last persisted checkpoint.
    ///
    /// The checkpoint record is re-verified before the chain resumes from its
    /// height and empty counter. With no checkpoint the chain starts from the
    /// zero genesis hash. The store is attached for future checkpoints.
    pub fn recover(
        config: PohConfig,
        store: Arc<dyn ChainCheckpointStore>,
        logger: Logger,
    ) -> Result<Self, PohError> {
        config
            .validate()
            .map_err(|e| PohError::InvalidConfig(e.to_string()))?;

        let checkpoint = store
            .latest_checkpoint()
            .map_err(PohError::CheckpointLoad)?;

        let head = match checkpoint {
            Some(record) => {
                record::verify_records(std::slice::from_ref(&record)).map_err(|source| {
                    PohError::CorruptCheckpoint {
                        height: record.chain_height,
                        source,
                    }
                })?;
                slog::info!(
                    logger,
                    "Resuming chain from checkpoint";
                    "height" => record.chain_height,
                    "hash" => short_hex(&record.current_hash),
                    "slot" => record.slot,
                );
                ChainHead::from_record(&record)
            }
            None => {
                slog::info!(logger, "No checkpoint found, starting chain from genesis");
                ChainHead::genesis(ZERO_HASH)
            }
        };

        Ok(Self::from_head(config, head, logger).with_store(store))
    }

    fn from_head(config: PohConfig, head: ChainHead, logger: Logger) -> Self {
        Self {
            config,
            cursor: Mutex::new(ChainCursor {
                head,
                halted: false,
            }),
            published: ArcSwap::from_pointee(head),
            store: None,
            signer: None,
            logger,
        }
    }

    /// Attaches the checkpoint store used every `checkpoint_interval` heights.
    pub fn with_store(mut self, store: Arc<dyn ChainCheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attaches a producer signer; every later record carries its signature.
    pub fn with_signer(mut self, signer: Arc<dyn RecordSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Appends an event. `None` is an empty heartbeat event.
    pub fn append_event(&self, event_data: Option<&[u8]>) -> Result<ChainRecord, PohError> {
        let event = match event_data {
            Some(data) => PendingEvent {
                kind: EventKind::System,
                digest: hash::hash(data),
                event_id: None,
            },
            None => PendingEvent {
                kind: EventKind::Empty,
                digest: ZERO_HASH,
                event_id: None,
            },
        };
        self.append_pending(event)
    }

    /// Appends a committed block, identified by its hash.
    ///
    /// With a store attached the record is always persisted, whatever the
    /// checkpoint interval.
    pub fn append_block_event(&self, block_hash: Hash) -> Result<ChainRecord, PohError> {
        self.append_pending(PendingEvent {
            kind: EventKind::Block,
            digest: hash::hash(&block_hash),
            event_id: Some(block_hash),
        })
    }

    /// Timestamps a single transaction.
    pub fn timestamp_transaction(&self, tx: &Transaction) -> Result<ChainRecord, PohError> {
        let event = self.transaction_event(tx)?;
        self.append_pending(event)
    }

    /// Timestamps `txs` in order, as one contiguous run of the chain.
    ///
    /// The cursor lock is held for the whole batch, so no other event can be
    /// interleaved. If a checkpoint fails mid-batch, the records already
    /// appended stay in the chain and the error is returned.
    pub fn batch_timestamp_transactions<T: AsRef<Transaction>>(
        &self,
        txs: &[T],
    ) -> Result<Vec<ChainRecord>, PohError> {
        let events = txs
            .iter()
            .map(|tx| self.transaction_event(tx.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut cursor = self.lock_cursor()?;
        let mut records = Vec::with_capacity(events.len());
        let mut result = Ok(());
        for event in events {
            match self.append_locked(&mut cursor, event) {
                Ok(record) => records.push(record),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.publish(&cursor);
        result.map(|()| records)
    }

    /// Moves the engine into `slot`. Slots never go backwards.
    ///
    /// Returns the slot in effect after the call.
    pub fn enter_slot(&self, slot: u64) -> Result<u64, PohError> {
        let mut cursor = self.lock_cursor()?;
        if slot > cursor.head.slot {
            cursor.head.slot = slot;
            self.publish(&cursor);
        }
        Ok(cursor.head.slot)
    }

    /// Latest published head. Never blocks.
    pub fn head(&self) -> Arc<ChainHead> {
        self.published.load_full()
    }

    pub fn current_hash(&self) -> Hash {
        self.published.load().current_hash
    }

    pub fn current_height(&self) -> u64 {
        self.published.load().height
    }

    pub fn current_slot(&self) -> u64 {
        self.published.load().slot
    }

    /// Whether an earlier fatal error has halted the chain.
    pub fn is_halted(&self) -> bool {
        match self.cursor.lock() {
            Ok(cursor) => cursor.halted,
            Err(_) => true,
        }
    }

    /// Replays `records` and reports the first inconsistent position.
    pub fn verify_records(records: &[ChainRecord]) -> Result<(), VerifyError> {
        record::verify_records(records)
    }

    fn transaction_event(&self, tx: &Transaction) -> Result<PendingEvent, PohError> {
        let bytes = tx.canonical_bytes().map_err(|e| {
            let err = PohError::Encoding(e.to_string());
            self.halt(&err);
            err
        })?;
        Ok(PendingEvent {
            kind: EventKind::Transaction,
            digest: hash::hash(&bytes),
            event_id: Some(tx.id),
        })
    }

    fn append_pending(&self, event: PendingEvent) -> Result<ChainRecord, PohError> {
        let mut cursor = self.lock_cursor()?;
        let record = self.append_locked(&mut cursor, event)?;
        self.publish(&cursor);
        Ok(record)
    }

    fn lock_cursor(&self) -> Result<std::sync::MutexGuard<'_, ChainCursor>, PohError> {
        let cursor = self.cursor.lock().map_err(|_| {
            slog::crit!(self.logger, "Chain writer poisoned, chain halted");
            PohError::WriterPoisoned
        })?;
        if cursor.halted {
            return Err(PohError::Halted);
        }
        Ok(cursor)
    }

    /// Extends the chain by one record. The cursor only moves on success.
    fn append_locked(
        &self,
        cursor: &mut ChainCursor,
        event: PendingEvent,
    ) -> Result<ChainRecord, PohError> {
        let head = cursor.head;
        let height = head.height + 1;

        let empty_event_counter = if event.kind == EventKind::Empty {
            let next = head.empty_event_counter + 1;
            if next > self.config.empty_event_ceiling {
                cursor.halted = true;
                slog::crit!(
                    self.logger,
                    "Empty event counter exceeded ceiling, chain halted";
                    "ceiling" => self.config.empty_event_ceiling,
                    "height" => head.height,
                );
                return Err(PohError::EmptyCounterOverflow {
                    ceiling: self.config.empty_event_ceiling,
                    height: head.height,
                });
            }
            next
        } else {
            0
        };

        let current_hash = record::next_hash(&head.current_hash, &event.digest, empty_event_counter);
        let producer_signature = self.signer.as_ref().map(|s| s.sign(&current_hash));

        let record = ChainRecord {
            previous_hash: head.current_hash,
            event_digest: event.digest,
            current_hash,
            empty_event_counter,
            event_kind: event.kind,
            chain_height: height,
            slot: head.slot,
            event_id: event.event_id,
            producer_signature,
        };

        if self.checkpoint_due(height, event.kind) {
            self.persist_with_backoff(&record)?;
        }

        cursor.head = ChainHead {
            current_hash,
            height,
            empty_event_counter,
            slot: head.slot,
        };
        Ok(record)
    }

    fn checkpoint_due(&self, height: u64, kind: EventKind) -> bool {
        if self.store.is_none() {
            return false;
        }
        kind == EventKind::Block
            || (self.config.checkpoint_interval > 0
                && height % self.config.checkpoint_interval == 0)
    }

    fn persist_with_backoff(&self, record: &ChainRecord) -> Result<(), PohError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };

        let attempts = self.config.persist_max_retries + 1;
        let mut backoff = Duration::from_millis(self.config.persist_backoff_ms);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match store.persist_checkpoint(record) {
                Ok(()) => {
                    slog::debug!(
                        self.logger,
                        "Checkpoint persisted";
                        "height" => record.chain_height,
                        "hash" => short_hex(&record.current_hash),
                    );
                    return Ok(());
                }
                Err(e) => {
                    slog::warn!(
                        self.logger,
                        "Checkpoint persist failed";
                        "height" => record.chain_height,
                        "attempt" => attempt,
                        "error" => %e,
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        thread::sleep(backoff);
                        backoff = backoff.saturating_mul(2);
                    }
                }
            }
        }

        Err(PohError::Persist {
            height: record.chain_height,
            attempts,
            source: last_error.unwrap_or_else(|| anyhow::anyhow!("checkpoint store unavailable")),
        })
    }

    fn publish(&self, cursor: &ChainCursor) {
        self.published.store(Arc::new(cursor.head));
    }

    fn halt(&self, err: &PohError) {
        slog::crit!(self.logger, "Fatal chain error, chain halted"; "error" => %err);
        if let Ok(mut cursor) = self.cursor.lock() {
            cursor.halted = true;
        }
    }
}
