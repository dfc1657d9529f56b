use anyhow::Result;

use crate::{crypto::Hash, state::block::Block};

/// Consensus, validation and storage hand-off for assembled blocks.
pub trait BlockProcessor: Send + Sync {
    /// Accepts or rejects `block`. `Ok` commits it; any error rejects it and
    /// the block's transactions go back to the pool.
    fn process_block(&self, block: &Block) -> Result<()>;
}

/// Source of the parent for the next block.
pub trait LatestBlockProvider: Send + Sync {
    /// The most recently committed block, `None` before the first commit.
    fn latest_block(&self) -> Result<Option<Block>>;
}

/// Execution-layer state root committed to by block headers.
pub trait StateRootProvider: Send + Sync {
    fn state_root(&self) -> Hash;
}
