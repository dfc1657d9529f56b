//! Block Assembler - One Candidate Block per Slot
//!
//! At every slot boundary the assembler pulls the highest-fee transactions
//! from the pool, stamps them into the hash chain to fix their order, builds
//! the header and body, and hands the block to the [`BlockProcessor`].
//!
//! An empty pool still yields an (empty) block: slot cadence outranks
//! fullness. A rejected or failed slot returns its transactions to the pool.

mod block_assembler;
pub mod clock;
mod service;
pub mod traits;

pub use block_assembler::{
    AssemblerState, AssemblerStats, AssemblyError, BlockAssembler, SlotOutcome,
};
pub use clock::{SlotClock, SlotTick, tick_channel};
pub use service::{AssemblerChannels, AssemblerService};
pub use traits::{BlockProcessor, LatestBlockProvider, StateRootProvider};
