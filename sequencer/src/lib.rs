//! Proof-of-History sequencer core.
//!
//! - [`poh`]: the single-writer hash chain that orders every event
//! - [`mempool`]: sharded, fixed-capacity transaction pool with top-k selection
//! - [`assembler`]: one candidate block per slot, stamped into the chain
//! - [`storage`]: redb-backed checkpoints and committed blocks
//! - [`context`]: node identity and status cache with an explicit lifecycle

pub mod assembler;
pub mod config;
pub mod context;
pub mod crypto;
pub mod logging;
pub mod mempool;
pub mod poh;
pub mod state;
pub mod storage;
pub mod validation;
