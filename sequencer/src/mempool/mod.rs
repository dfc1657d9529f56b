//! Transaction Pool - Sharded Admission and Top-K Selection
//!
//! Accepts transactions from any number of concurrent producers and serves a
//! single consumer, the block assembler, a "top k by fee" extraction.
//!
//! ## Architecture
//!
//! ```text
//!  RPC / P2P producers (many threads)
//!        │  add_transaction: shard = id mod N
//!        ▼
//!  ┌─────────┬─────────┬─────┬─────────┐
//!  │ shard 0 │ shard 1 │ ... │ shard N │   fixed-capacity rings,
//!  └────┬────┴────┬────┴─────┴────┬────┘   CAS on tail, lock per shard
//!       │ local top-k (min-heap)  │
//!       └──────────► merge ◄──────┘
//!                     │ global top-k, tombstone winners
//!                     ▼
//!               Block Assembler
//! ```
//!
//! ## Invariants
//!
//! - Live entries never exceed `shard_count × shard_capacity`
//! - An accepted entry stays live until it is selected or removed
//! - An entry is returned by selection at most once

mod pool;
mod shard;
mod types;

pub use pool::TransactionPool;
pub use types::{PoolStats, PooledEntry, SubmitError};
