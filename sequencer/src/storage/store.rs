use std::path::Path;

use anyhow::{Context, Result};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata};
use slog::Logger;

use crate::{
    assembler::{BlockProcessor, LatestBlockProvider},
    config::StorageConfig,
    crypto::hash::{Hash, ZERO_HASH, short_hex},
    poh::{ChainCheckpointStore, ChainRecord},
    state::block::Block,
};

use super::{
    conversions::{deserialize_from_db, serialize_for_db},
    tables::{BLOCKS, CHECKPOINTS, SLOT_INDEX},
};

/// Durable store for chain checkpoints and committed blocks.
pub struct ChainStore {
    db: Database,
    logger: Logger,
}

impl ChainStore {
    /// Opens a database from a path to the database file.
    pub fn open<P: AsRef<Path>>(path: P, logger: Logger) -> Result<Self> {
        let path = path.as_ref();
        let db = if path.exists() {
            Database::open(path).context("Failed to open database")?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            Database::create(path).context("Failed to create database")?
        };
        let store = Self { db, logger };
        store.init_tables()?;
        Ok(store)
    }

    /// Opens the database named by a storage configuration.
    pub fn from_config(config: &StorageConfig, logger: Logger) -> Result<Self> {
        Self::open(&config.path, logger)
    }

    /// Initializes the tables in the database
    fn init_tables(&self) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            write_txn
                .open_table(CHECKPOINTS)
                .context("Failed to open checkpoints table")?;
            write_txn
                .open_table(BLOCKS)
                .context("Failed to open blocks table")?;
            write_txn
                .open_table(SLOT_INDEX)
                .context("Failed to open slot index table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")
    }

    /// Persists a checkpoint record, keyed by its height.
    pub fn put_checkpoint(&self, record: &ChainRecord) -> Result<()> {
        let bytes = serialize_for_db(record)?;
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(CHECKPOINTS)
                .context("Failed to open checkpoints table")?;
            table
                .insert(record.chain_height, bytes.as_slice())
                .context("Failed to insert checkpoint")?;
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")
    }

    /// Retrieves the checkpoint at `height`, if one was persisted.
    pub fn get_checkpoint(&self, height: u64) -> Result<Option<ChainRecord>> {
        let read = self.db.begin_read()?;
        let table = read.open_table(CHECKPOINTS)?;
        match table.get(height)? {
            Some(row) => Ok(Some(deserialize_from_db(row.value())?)),
            None => Ok(None),
        }
    }

    /// Retrieves the checkpoint with the greatest height.
    pub fn get_latest_checkpoint(&self) -> Result<Option<ChainRecord>> {
        let read = self.db.begin_read()?;
        let table = read.open_table(CHECKPOINTS)?;
        match table.last()? {
            Some((_, row)) => Ok(Some(deserialize_from_db(row.value())?)),
            None => Ok(None),
        }
    }

    /// Stores a block and indexes it by slot, in one transaction.
    pub fn put_block(&self, block: &Block) -> Result<()> {
        let hash = block.hash();
        let bytes = serialize_for_db(block)?;
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut blocks = write_txn
                .open_table(BLOCKS)
                .context("Failed to open blocks table")?;
            blocks
                .insert(hash.as_slice(), bytes.as_slice())
                .context("Failed to insert block")?;
            let mut slots = write_txn
                .open_table(SLOT_INDEX)
                .context("Failed to open slot index table")?;
            slots
                .insert(block.slot(), hash.as_slice())
                .context("Failed to index block")?;
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")
    }

    /// Retrieves a block from the database, if it exists.
    pub fn get_block(&self, hash: &Hash) -> Result<Option<Block>> {
        self.read_block(hash.as_slice())
    }

    /// Retrieves the block committed for `slot`, if any.
    pub fn get_block_by_slot(&self, slot: u64) -> Result<Option<Block>> {
        let hash = {
            let read = self.db.begin_read()?;
            let table = read.open_table(SLOT_INDEX)?;
            match table.get(slot)? {
                Some(row) => row.value().to_vec(),
                None => return Ok(None),
            }
        };
        self.read_block(&hash)
    }

    /// Retrieves the block with the highest slot.
    pub fn get_latest_block(&self) -> Result<Option<Block>> {
        let hash = {
            let read = self.db.begin_read()?;
            let table = read.open_table(SLOT_INDEX)?;
            match table.last()? {
                Some((_, row)) => row.value().to_vec(),
                None => return Ok(None),
            }
        };
        self.read_block(&hash)
    }

    /// Number of committed blocks.
    pub fn block_count(&self) -> Result<u64> {
        let read = self.db.begin_read()?;
        let table = read.open_table(SLOT_INDEX)?;
        Ok(table.len()?)
    }

    fn read_block(&self, hash: &[u8]) -> Result<Option<Block>> {
        let read = self.db.begin_read()?;
        let table = read.open_table(BLOCKS)?;
        match table.get(hash)? {
            Some(row) => Ok(Some(deserialize_from_db(row.value())?)),
            None => Ok(None),
        }
    }
}

impl ChainCheckpointStore for ChainStore {
    fn persist_checkpoint(&self, record: &ChainRecord) -> Result<()> {
        self.put_checkpoint(record)
    }

    fn latest_checkpoint(&self) -> Result<Option<ChainRecord>> {
        self.get_latest_checkpoint()
    }
}

impl BlockProcessor for ChainStore {
    /// Commits `block` if it extends the latest stored block.
    fn process_block(&self, block: &Block) -> Result<()> {
        if block.header.tx_count as usize != block.body.transactions.len() {
            anyhow::bail!(
                "Block declares {} transactions but carries {}",
                block.header.tx_count,
                block.body.transactions.len()
            );
        }

        let (expected_parent, last_slot) = match self.get_latest_block()? {
            Some(parent) => (parent.hash(), Some(parent.slot())),
            None => (ZERO_HASH, None),
        };
        if block.header.parent_hash != expected_parent {
            anyhow::bail!(
                "Block parent {} does not match latest block {}",
                short_hex(&block.header.parent_hash),
                short_hex(&expected_parent)
            );
        }
        if last_slot.is_some_and(|last| block.slot() <= last) {
            anyhow::bail!("Block slot {} is not after latest slot", block.slot());
        }

        self.put_block(block)?;
        slog::debug!(
            self.logger,
            "Block stored";
            "slot" => block.slot(),
            "hash" => short_hex(&block.hash()),
        );
        Ok(())
    }
}

impl LatestBlockProvider for ChainStore {
    fn latest_block(&self) -> Result<Option<Block>> {
        self.get_latest_block()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        poh::EventKind,
        state::block::{BlockBody, BlockHeader},
    };

    fn logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn open_temp() -> (tempfile::TempDir, ChainStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChainStore::open(dir.path().join("chain.redb"), logger()).unwrap();
        (dir, store)
    }

    fn record(height: u64) -> ChainRecord {
        let previous_hash = [height as u8; 32];
        let current_hash = crate::poh::next_hash(&previous_hash, &ZERO_HASH, 1);
        ChainRecord {
            previous_hash,
            event_digest: ZERO_HASH,
            current_hash,
            empty_event_counter: 1,
            event_kind: EventKind::Empty,
            chain_height: height,
            slot: 2,
            event_id: None,
            producer_signature: Some(vec![1, 2, 3]),
        }
    }

    fn block(parent_hash: Hash, slot: u64) -> Block {
        Block::new(
            BlockHeader {
                parent_hash,
                state_root: ZERO_HASH,
                chain_hash: [5u8; 32],
                chain_height: slot * 10,
                slot,
                parent_slot: slot.saturating_sub(1),
                tx_count: 0,
                fee_rule_hash: ZERO_HASH,
            },
            BlockBody::empty(),
        )
    }

    #[test]
    fn checkpoints_round_trip() {
        let (_dir, store) = open_temp();
        assert!(store.get_latest_checkpoint().unwrap().is_none());

        store.put_checkpoint(&record(1024)).unwrap();
        store.put_checkpoint(&record(2048)).unwrap();

        assert_eq!(store.get_checkpoint(1024).unwrap(), Some(record(1024)));
        assert_eq!(store.get_latest_checkpoint().unwrap(), Some(record(2048)));
        assert!(store.get_checkpoint(7).unwrap().is_none());
    }

    #[test]
    fn blocks_are_indexed_by_hash_and_slot() {
        let (_dir, store) = open_temp();
        let first = block(ZERO_HASH, 1);
        store.process_block(&first).unwrap();
        let second = block(first.hash(), 3);
        store.process_block(&second).unwrap();

        assert_eq!(store.get_block(&first.hash()).unwrap(), Some(first.clone()));
        assert_eq!(store.get_block_by_slot(3).unwrap(), Some(second.clone()));
        assert!(store.get_block_by_slot(2).unwrap().is_none());
        assert_eq!(store.latest_block().unwrap(), Some(second));
        assert_eq!(store.block_count().unwrap(), 2);
    }

    #[test]
    fn process_block_rejects_wrong_parent() {
        let (_dir, store) = open_temp();
        store.process_block(&block(ZERO_HASH, 1)).unwrap();
        let orphan = block([9u8; 32], 2);
        let err = store.process_block(&orphan).unwrap_err();
        assert!(err.to_string().contains("does not match"));
        assert_eq!(store.block_count().unwrap(), 1);
    }

    #[test]
    fn process_block_rejects_count_mismatch() {
        let (_dir, store) = open_temp();
        let mut bad = block(ZERO_HASH, 1);
        bad.header.tx_count = 2;
        assert!(store.process_block(&bad).is_err());
    }

    #[test]
    fn reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chain.redb");
        {
            let store = ChainStore::open(&path, logger()).unwrap();
            store.put_checkpoint(&record(8)).unwrap();
        }
        let store = ChainStore::open(&path, logger()).unwrap();
        assert_eq!(store.latest_checkpoint().unwrap(), Some(record(8)));
    }
}
